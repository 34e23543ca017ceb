//! Time and token generation seams, with real and fake implementations so
//! expiry and approval flows are deterministic under test.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Runtime services injected into the engine and node executors.
#[derive(Clone)]
pub struct RuntimeContext {
    pub time: Arc<dyn TimeProvider>,
    pub tokens: Arc<dyn TokenGenerator>,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self {
            time: Arc::new(RealTimeProvider),
            tokens: Arc::new(RandTokenGenerator),
        }
    }
}

pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub trait TokenGenerator: Send + Sync {
    /// A random, unguessable, single-use approval token.
    fn approval_token(&self) -> String;
}

// --- Real implementations ---

pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct RandTokenGenerator;

impl TokenGenerator for RandTokenGenerator {
    fn approval_token(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut out = String::with_capacity(64);
        for b in bytes {
            let _ = write!(out, "{b:02x}");
        }
        out
    }
}

// --- Fake implementations ---

/// Settable clock for tests; `advance` moves expiry deadlines into the past
/// without sleeping.
pub struct FakeTimeProvider {
    now: Mutex<DateTime<Utc>>,
}

impl FakeTimeProvider {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock poisoned") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock poisoned");
        *guard += by;
    }
}

impl TimeProvider for FakeTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock poisoned")
    }
}

/// Deterministic token sequence: `prefix-0`, `prefix-1`, ...
pub struct FakeTokenGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl FakeTokenGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl TokenGenerator for FakeTokenGenerator {
    fn approval_token(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rand_token_shape() {
        let a = RandTokenGenerator.approval_token();
        let b = RandTokenGenerator.approval_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fake_time_advance() {
        let clock = FakeTimeProvider::new("2026-01-01T00:00:00Z".parse().unwrap());
        clock.advance(Duration::days(31));
        assert_eq!(clock.now(), "2026-02-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_fake_tokens_are_sequential() {
        let tokens = FakeTokenGenerator::new("tok");
        assert_eq!(tokens.approval_token(), "tok-0");
        assert_eq!(tokens.approval_token(), "tok-1");
    }
}
