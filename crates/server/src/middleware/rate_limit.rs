//! Rate limiting middleware.
//!
//! Four interchangeable strategies keyed by client identifier (user id when
//! logged in, else IP): fixed window, sliding window, token bucket, and an
//! adaptive variant that lowers the fixed-window max under process load.
//!
//! State lives in process memory behind a mutex. This is a single-instance
//! design; deploying multiple replicas needs an external store instead.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use crate::config::{RateLimitSettings, RateLimitStrategy};
use crate::models::{CurrentUser, session_keys};

const HEADER_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const HEADER_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const HEADER_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");
const HEADER_LEGACY_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const HEADER_LEGACY_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const HEADER_LEGACY_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Per-key limiter state. The variant matches the configured strategy;
/// adaptive reuses the fixed-window accounting.
#[derive(Debug)]
enum Entry {
    Window { count: u32, reset_at: Instant },
    Log { timestamps: VecDeque<Instant> },
    Bucket { tokens: f64, last_refill: Instant },
}

impl Entry {
    /// Whether the entry can be dropped by the sweeper.
    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        match self {
            Self::Window { reset_at, .. } => *reset_at <= now,
            Self::Log { timestamps } => timestamps
                .back()
                .is_none_or(|last| now.duration_since(*last) > window),
            Self::Bucket { last_refill, .. } => now.duration_since(*last_refill) > window,
        }
    }
}

/// Outcome of a rate limit check, with everything needed for headers.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    /// Effective max for this check (adaptive may lower it).
    pub limit: u32,
    pub remaining: u32,
    /// Time until the client's window/bucket fully resets.
    pub reset_after: Duration,
    /// Suggested wait before retrying; only meaningful when rejected.
    pub retry_after: Duration,
}

/// In-memory rate limiter shared across requests.
pub struct RateLimiter {
    strategy: RateLimitStrategy,
    max_requests: u32,
    window: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(strategy: RateLimitStrategy, max_requests: u32, window: Duration) -> Self {
        Self {
            strategy,
            max_requests: max_requests.max(1),
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter for general API traffic, using the configured strategy.
    #[must_use]
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(settings.strategy, settings.max_requests, settings.window)
    }

    /// Strict limiter for auth endpoints. Always fixed window: predictable
    /// lockout behaviour matters more than smoothing for login brute force.
    #[must_use]
    pub fn for_auth(settings: &RateLimitSettings) -> Self {
        Self::new(
            RateLimitStrategy::FixedWindow,
            settings.auth_max_requests,
            settings.window,
        )
    }

    /// Check a request against the limit.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Check at an explicit instant. Separated from [`Self::check`] so tests
    /// can drive time.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let max = match self.strategy {
            RateLimitStrategy::Adaptive => effective_max(self.max_requests, sample_load()),
            _ => self.max_requests,
        };

        #[allow(clippy::expect_used)] // lock poisoning is unrecoverable
        let mut entries = self.entries.lock().expect("rate limiter lock poisoned");

        match self.strategy {
            RateLimitStrategy::FixedWindow | RateLimitStrategy::Adaptive => {
                self.check_window(&mut entries, key, now, max)
            }
            RateLimitStrategy::SlidingWindow => self.check_log(&mut entries, key, now, max),
            RateLimitStrategy::TokenBucket => self.check_bucket(&mut entries, key, now, max),
        }
    }

    fn check_window(
        &self,
        entries: &mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
        max: u32,
    ) -> Decision {
        let entry = entries.entry(key.to_owned()).or_insert(Entry::Window {
            count: 0,
            reset_at: now + self.window,
        });

        // Strategy changes at runtime are not supported; replace mismatches.
        let Entry::Window { count, reset_at } = entry else {
            *entry = Entry::Window {
                count: 0,
                reset_at: now + self.window,
            };
            return self.check_window(entries, key, now, max);
        };

        if *reset_at <= now {
            *count = 0;
            *reset_at = now + self.window;
        }

        let reset_after = reset_at.duration_since(now);
        if *count >= max {
            return Decision {
                allowed: false,
                limit: max,
                remaining: 0,
                reset_after,
                retry_after: reset_after,
            };
        }

        *count += 1;
        Decision {
            allowed: true,
            limit: max,
            remaining: max - *count,
            reset_after,
            retry_after: Duration::ZERO,
        }
    }

    fn check_log(
        &self,
        entries: &mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
        max: u32,
    ) -> Decision {
        let entry = entries.entry(key.to_owned()).or_insert(Entry::Log {
            timestamps: VecDeque::new(),
        });

        let Entry::Log { timestamps } = entry else {
            *entry = Entry::Log {
                timestamps: VecDeque::new(),
            };
            return self.check_log(entries, key, now, max);
        };

        // Prune everything outside the window before counting.
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let count = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
        let reset_after = timestamps
            .front()
            .map_or(Duration::ZERO, |oldest| {
                self.window.saturating_sub(now.duration_since(*oldest))
            });

        if count >= max {
            return Decision {
                allowed: false,
                limit: max,
                remaining: 0,
                reset_after,
                retry_after: reset_after,
            };
        }

        timestamps.push_back(now);
        Decision {
            allowed: true,
            limit: max,
            remaining: max - count - 1,
            reset_after: if count == 0 { self.window } else { reset_after },
            retry_after: Duration::ZERO,
        }
    }

    fn check_bucket(
        &self,
        entries: &mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
        max: u32,
    ) -> Decision {
        let capacity = f64::from(max);
        // Full refill takes one window.
        let refill_rate = capacity / self.window.as_secs_f64();

        let entry = entries.entry(key.to_owned()).or_insert(Entry::Bucket {
            tokens: capacity,
            last_refill: now,
        });

        let Entry::Bucket {
            tokens,
            last_refill,
        } = entry
        else {
            *entry = Entry::Bucket {
                tokens: capacity,
                last_refill: now,
            };
            return self.check_bucket(entries, key, now, max);
        };

        let elapsed = now.duration_since(*last_refill).as_secs_f64();
        *tokens = (*tokens + elapsed * refill_rate).min(capacity);
        *last_refill = now;

        let reset_after = Duration::from_secs_f64((capacity - *tokens) / refill_rate);
        if *tokens < 1.0 {
            let retry_after = Duration::from_secs_f64((1.0 - *tokens) / refill_rate);
            return Decision {
                allowed: false,
                limit: max,
                remaining: 0,
                reset_after,
                retry_after,
            };
        }

        *tokens -= 1.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let remaining = tokens.floor().max(0.0) as u32;
        Decision {
            allowed: true,
            limit: max,
            remaining,
            reset_after,
            retry_after: Duration::ZERO,
        }
    }

    /// Evict entries whose window has fully passed.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    /// Sweep at an explicit instant.
    pub fn sweep_at(&self, now: Instant) {
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("rate limiter lock poisoned");
        entries.retain(|_, entry| !entry.is_expired(now, self.window));
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        #[allow(clippy::expect_used)]
        let entries = self.entries.lock().expect("rate limiter lock poisoned");
        entries.len()
    }

    /// Spawn a background task that sweeps expired entries periodically.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                limiter.sweep();
                tracing::debug!(tracked = limiter.tracked_clients(), "Rate limiter swept");
            }
        })
    }
}

// =============================================================================
// Adaptive load scaling
// =============================================================================

/// Snapshot of process/host utilisation, each in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadSample {
    pub memory: f64,
    pub cpu: f64,
}

/// Effective max under load. The limit only ever scales down; an idle host
/// keeps the configured max.
#[must_use]
pub fn effective_max(max: u32, load: LoadSample) -> u32 {
    let worst = load.memory.max(load.cpu);
    let factor = if worst >= 0.95 {
        0.25
    } else if worst >= 0.80 {
        0.5
    } else if worst >= 0.60 {
        0.75
    } else {
        1.0
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = (f64::from(max) * factor) as u32;
    scaled.max(1)
}

/// Sample current host load from procfs. Returns zeros when unavailable so
/// the limiter degrades to plain fixed-window behaviour.
fn sample_load() -> LoadSample {
    LoadSample {
        memory: read_memory_ratio().unwrap_or(0.0),
        cpu: read_cpu_ratio().unwrap_or(0.0),
    }
}

fn read_memory_ratio() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kb(rest);
        }
    }
    let (total, available) = (total?, available?);
    if total == 0.0 {
        return None;
    }
    Some(((total - available) / total).clamp(0.0, 1.0))
}

fn parse_kb(rest: &str) -> Option<f64> {
    rest.trim().split_whitespace().next()?.parse().ok()
}

fn read_cpu_ratio() -> Option<f64> {
    let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
    let one_minute: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
    let cores = std::thread::available_parallelism().map_or(1, std::num::NonZero::get);
    #[allow(clippy::cast_precision_loss)]
    Some((one_minute / cores as f64).clamp(0.0, 1.0))
}

// =============================================================================
// Middleware
// =============================================================================

/// Rate limiting middleware function.
///
/// Keyed by the logged-in user when available, otherwise the client IP.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let session = request.extensions().get::<Session>().cloned();
    let ip = extract_client_ip(&request);
    let key = client_key(session, ip).await;
    let decision = limiter.check(&key);

    if decision.allowed {
        let mut response = next.run(request).await;
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    tracing::warn!(client = %key, retry_after = decision.retry_after.as_secs(), "Rate limit exceeded");

    let retry_secs = decision.retry_after.as_secs().max(1);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        axum::Json(serde_json::json!({
            "error": "rate_limited",
            "message": "Too many requests. Please try again later.",
            "retry_after": retry_secs,
        })),
    )
        .into_response();

    apply_headers(response.headers_mut(), &decision);
    if let Ok(value) = HeaderValue::from_str(&retry_secs.to_string()) {
        response.headers_mut().insert(RETRY_AFTER, value);
    }

    response
}

fn apply_headers(headers: &mut axum::http::HeaderMap, decision: &Decision) {
    let limit = decision.limit.to_string();
    let remaining = decision.remaining.to_string();
    let reset = decision.reset_after.as_secs().to_string();

    for (name, value) in [
        (HEADER_LIMIT, &limit),
        (HEADER_REMAINING, &remaining),
        (HEADER_RESET, &reset),
        (HEADER_LEGACY_LIMIT, &limit),
        (HEADER_LEGACY_REMAINING, &remaining),
        (HEADER_LEGACY_RESET, &reset),
    ] {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }
}

/// Identify the client: logged-in user id first, then proxy-aware IP.
///
/// Session and IP are taken by value so no request borrow is held across
/// the session read.
async fn client_key(session: Option<Session>, ip: IpAddr) -> String {
    if let Some(session) = session
        && let Ok(Some(user)) = session.get::<CurrentUser>(session_keys::CURRENT_USER).await
    {
        return format!("user:{}", user.id.as_i32());
    }

    format!("ip:{ip}")
}

/// Extract the client IP, preferring proxy headers.
pub(crate) fn extract_client_ip(request: &Request) -> IpAddr {
    let headers = request.headers();

    // X-Forwarded-For: first IP in the chain is the original client
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map_or(IpAddr::from([127, 0, 0, 1]), |info| info.0.ip())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn limiter(strategy: RateLimitStrategy, max: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(strategy, max, Duration::from_secs(window_secs))
    }

    #[test]
    fn fixed_window_rejects_after_max_until_reset() {
        let limiter = limiter(RateLimitStrategy::FixedWindow, 3, 60);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("c", start).allowed);
        }
        let rejected = limiter.check_at("c", start);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);

        // Still inside the window
        assert!(!limiter.check_at("c", start + Duration::from_secs(59)).allowed);

        // Window reset
        assert!(limiter.check_at("c", start + Duration::from_secs(61)).allowed);
    }

    #[test]
    fn fixed_window_remaining_counts_down() {
        let limiter = limiter(RateLimitStrategy::FixedWindow, 3, 60);
        let start = Instant::now();

        assert_eq!(limiter.check_at("c", start).remaining, 2);
        assert_eq!(limiter.check_at("c", start).remaining, 1);
        assert_eq!(limiter.check_at("c", start).remaining, 0);
    }

    #[test]
    fn sliding_window_prunes_old_timestamps() {
        let limiter = limiter(RateLimitStrategy::SlidingWindow, 2, 10);
        let start = Instant::now();

        assert!(limiter.check_at("c", start).allowed);
        assert!(limiter.check_at("c", start + Duration::from_secs(5)).allowed);
        assert!(!limiter.check_at("c", start + Duration::from_secs(6)).allowed);

        // First timestamp ages out, capacity frees up
        assert!(limiter.check_at("c", start + Duration::from_secs(11)).allowed);
    }

    #[test]
    fn token_bucket_never_exceeds_capacity() {
        let limiter = limiter(RateLimitStrategy::TokenBucket, 5, 10);
        let start = Instant::now();

        // Burn one token, then idle far longer than a full refill
        assert!(limiter.check_at("c", start).allowed);
        let decision = limiter.check_at("c", start + Duration::from_secs(3600));

        // Capacity restored but not exceeded: 5 tokens means exactly 4
        // remain after this request
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn token_bucket_refills_proportionally() {
        let limiter = limiter(RateLimitStrategy::TokenBucket, 10, 10);
        let start = Instant::now();

        for _ in 0..10 {
            assert!(limiter.check_at("c", start).allowed);
        }
        assert!(!limiter.check_at("c", start).allowed);

        // One token per second; two seconds buys two requests
        assert!(limiter.check_at("c", start + Duration::from_secs(2)).allowed);
        assert!(limiter.check_at("c", start + Duration::from_secs(2)).allowed);
        assert!(!limiter.check_at("c", start + Duration::from_secs(2)).allowed);
    }

    #[test]
    fn keys_are_isolated() {
        let limiter = limiter(RateLimitStrategy::FixedWindow, 1, 60);
        let start = Instant::now();

        assert!(limiter.check_at("a", start).allowed);
        assert!(!limiter.check_at("a", start).allowed);
        assert!(limiter.check_at("b", start).allowed);
    }

    #[test]
    fn sweep_evicts_expired_entries() {
        let limiter = limiter(RateLimitStrategy::FixedWindow, 5, 10);
        let start = Instant::now();

        limiter.check_at("a", start);
        limiter.check_at("b", start);
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.sweep_at(start + Duration::from_secs(5));
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.sweep_at(start + Duration::from_secs(11));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn adaptive_scales_down_never_up() {
        let sample = |memory, cpu| LoadSample { memory, cpu };

        assert_eq!(effective_max(100, sample(0.1, 0.1)), 100);
        assert_eq!(effective_max(100, sample(0.7, 0.1)), 75);
        assert_eq!(effective_max(100, sample(0.1, 0.85)), 50);
        assert_eq!(effective_max(100, sample(0.99, 0.99)), 25);

        // Never above configured max, never below one
        assert!(effective_max(100, sample(0.0, 0.0)) <= 100);
        assert_eq!(effective_max(2, sample(0.99, 0.99)), 1);
    }

    #[test]
    fn rejected_decision_reports_retry_after() {
        let limiter = limiter(RateLimitStrategy::FixedWindow, 1, 60);
        let start = Instant::now();

        limiter.check_at("c", start);
        let rejected = limiter.check_at("c", start + Duration::from_secs(10));
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after.as_secs(), 50);
    }
}
