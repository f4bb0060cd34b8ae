//! Catalog seeding command.
//!
//! Inserts a small sample catalog for local development. Idempotent: rows
//! are matched on slug and skipped when present.

use rust_decimal::Decimal;
use sqlx::PgPool;

use super::CommandError;

struct SeedProduct {
    category_slug: &'static str,
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    price: Decimal,
    stock: i32,
    featured: bool,
}

const CATEGORIES: &[(&str, &str, &str)] = &[
    ("Necklaces", "necklaces", "Pendants, chains, and chokers"),
    ("Earrings", "earrings", "Studs, hoops, and drops"),
    ("Bracelets", "bracelets", "Bangles, cuffs, and charm bracelets"),
    ("Rings", "rings", "Statement and stacking rings"),
];

fn products() -> Vec<SeedProduct> {
    vec![
        SeedProduct {
            category_slug: "necklaces",
            name: "Pearl Pendant Necklace",
            slug: "pearl-pendant-necklace",
            description: "Freshwater pearl on a sterling silver chain.",
            price: Decimal::new(7900, 2),
            stock: 25,
            featured: true,
        },
        SeedProduct {
            category_slug: "earrings",
            name: "Gold Hoop Earrings",
            slug: "gold-hoop-earrings",
            description: "Classic 14k gold-plated hoops.",
            price: Decimal::new(4999, 2),
            stock: 40,
            featured: true,
        },
        SeedProduct {
            category_slug: "bracelets",
            name: "Braided Leather Bracelet",
            slug: "braided-leather-bracelet",
            description: "Hand-braided leather with a magnetic clasp.",
            price: Decimal::new(2950, 2),
            stock: 60,
            featured: false,
        },
        SeedProduct {
            category_slug: "rings",
            name: "Opal Stacking Ring",
            slug: "opal-stacking-ring",
            description: "Lab opal set in recycled sterling silver.",
            price: Decimal::new(3800, 2),
            stock: 30,
            featured: false,
        },
    ]
}

/// Seed the catalog tables.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an insert fails.
pub async fn run() -> Result<(), CommandError> {
    let pool = super::connect().await?;

    for (name, slug, description) in CATEGORIES {
        sqlx::query(
            "INSERT INTO categories (name, slug, description) VALUES ($1, $2, $3) \
             ON CONFLICT (slug) DO NOTHING",
        )
        .bind(name)
        .bind(slug)
        .bind(description)
        .execute(&pool)
        .await?;
    }

    for product in products() {
        seed_product(&pool, &product).await?;
    }

    tracing::info!("Seed data inserted");
    Ok(())
}

async fn seed_product(pool: &PgPool, product: &SeedProduct) -> Result<(), CommandError> {
    sqlx::query(
        "INSERT INTO products (category_id, name, slug, description, price, stock, featured) \
         SELECT c.id, $2, $3, $4, $5, $6, $7 FROM categories c WHERE c.slug = $1 \
         ON CONFLICT (slug) DO NOTHING",
    )
    .bind(product.category_slug)
    .bind(product.name)
    .bind(product.slug)
    .bind(product.description)
    .bind(product.price)
    .bind(product.stock)
    .bind(product.featured)
    .execute(pool)
    .await?;
    Ok(())
}
