//! Round-robin rotation over a pool of Gemini API keys.
//!
//! Free-tier Gemini keys hit per-key rate limits quickly. Spreading requests
//! over several keys, one per attempt, multiplies the available quota and
//! gives a 429'd request a fresh key on retry.
//!
//! The rotator is an ordinary value the caller constructs and shares (usually
//! behind an `Arc`) with every [`crate::pipeline::gemini::GeminiClient`]
//! that should draw from the same pool. Each `next_key` read-and-advance runs
//! inside one mutex critical section with no `.await`, so concurrent callers
//! may interleave out of initiation order but never receive a torn cursor.

use crate::error::QuizError;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Environment variable holding a comma-separated key list.
pub const KEYS_ENV_VAR: &str = "GEMINI_API_KEYS";

/// Single-key fallback variable.
pub const KEY_ENV_VAR: &str = "GEMINI_API_KEY";

#[derive(Default)]
struct KeyPool {
    keys: Vec<String>,
    cursor: usize,
}

/// Ordered credential pool with a wrapping cursor.
#[derive(Default)]
pub struct KeyRotator {
    pool: Mutex<KeyPool>,
}

impl KeyRotator {
    /// Build a rotator from any list of key-like strings.
    ///
    /// Blank entries are dropped and the rest are trimmed.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rotator = Self::default();
        rotator.set_keys(keys);
        rotator
    }

    /// Build a rotator from `GEMINI_API_KEYS`, falling back to `GEMINI_API_KEY`.
    ///
    /// An unset environment yields an empty rotator; the first `next_key`
    /// then fails with [`QuizError::NoKeysConfigured`].
    pub fn from_env() -> Self {
        let raw = std::env::var(KEYS_ENV_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| std::env::var(KEY_ENV_VAR).ok())
            .unwrap_or_default();
        Self::new(raw.split(','))
    }

    /// Replace the pool and reset the cursor to the first key.
    pub fn set_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let mut pool = self.lock();
        pool.keys = keys;
        pool.cursor = 0;
    }

    /// Return the key at the cursor and advance it, wrapping at the end.
    pub fn next_key(&self) -> Result<String, QuizError> {
        let mut pool = self.lock();
        if pool.keys.is_empty() {
            return Err(QuizError::NoKeysConfigured);
        }
        let key = pool.keys[pool.cursor].clone();
        pool.cursor = (pool.cursor + 1) % pool.keys.len();
        Ok(key)
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().keys.is_empty()
    }

    // A panic elsewhere while holding the lock cannot leave the pool in a
    // state that violates the cursor invariant, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, KeyPool> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for KeyRotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = self.lock();
        f.debug_struct("KeyRotator")
            .field("keys", &format_args!("<{} redacted>", pool.keys.len()))
            .field("cursor", &pool.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn cycles_through_every_key_then_wraps() {
        let rotator = KeyRotator::new(["k1", "k2", "k3"]);
        let first_round: Vec<String> = (0..3).map(|_| rotator.next_key().unwrap()).collect();
        assert_eq!(first_round, ["k1", "k2", "k3"]);
        assert_eq!(rotator.next_key().unwrap(), "k1");
    }

    #[test]
    fn empty_pool_fails_every_time() {
        let rotator = KeyRotator::default();
        for _ in 0..3 {
            assert!(matches!(rotator.next_key(), Err(QuizError::NoKeysConfigured)));
        }
    }

    #[test]
    fn set_keys_trims_filters_and_resets_cursor() {
        let rotator = KeyRotator::new(["a", "b"]);
        assert_eq!(rotator.next_key().unwrap(), "a");

        rotator.set_keys(["  x  ", "", "   ", "y"]);
        assert_eq!(rotator.len(), 2);
        assert_eq!(rotator.next_key().unwrap(), "x");
        assert_eq!(rotator.next_key().unwrap(), "y");
        assert_eq!(rotator.next_key().unwrap(), "x");
    }

    #[test]
    fn blank_only_list_leaves_pool_empty() {
        let rotator = KeyRotator::new(["", "  "]);
        assert!(rotator.is_empty());
        assert!(rotator.next_key().is_err());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let rotator = KeyRotator::new(["secret-key-123"]);
        let dbg = format!("{rotator:?}");
        assert!(!dbg.contains("secret-key-123"));
        assert!(dbg.contains("1 redacted"));
    }

    #[test]
    fn concurrent_callers_share_the_pool_evenly() {
        let rotator = Arc::new(KeyRotator::new(["a", "b", "c", "d"]));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let r = Arc::clone(&rotator);
                std::thread::spawn(move || (0..100).map(|_| r.next_key().unwrap()).collect::<Vec<_>>())
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for h in handles {
            for k in h.join().unwrap() {
                *counts.entry(k).or_insert(0usize) += 1;
            }
        }
        // 400 draws over 4 keys: strict rotation hands each key out 100 times.
        for key in ["a", "b", "c", "d"] {
            assert_eq!(counts[key], 100, "key {key}");
        }
    }
}
