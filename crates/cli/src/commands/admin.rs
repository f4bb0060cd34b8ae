//! Admin user management commands.

use miorah_core::UserRole;
use miorah_server::services::auth::AuthService;

use super::CommandError;

/// Create an admin user with the given credentials.
///
/// # Errors
///
/// Returns an error if the email is taken, the password is too weak, or the
/// database is unreachable.
pub async fn create_user(email: &str, password: &str) -> Result<(), CommandError> {
    let pool = super::connect().await?;

    let user = AuthService::new(&pool)
        .register_with_role(email, password, UserRole::Admin)
        .await?;

    tracing::info!(user_id = user.id.as_i32(), email = user.email.as_str(), "Admin user created");
    Ok(())
}
