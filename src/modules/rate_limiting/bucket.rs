//! Per-client bucket state for the token and leaky bucket algorithms.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// A thread-safe token bucket.
///
/// Starts full. Admission takes one token with a CAS loop; replenishment is
/// driven externally by [`TokenBucket::refill`] on a fixed tick.
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens (burst capacity).
    capacity: u64,

    /// Tokens restored per second.
    rate: f64,

    /// Current tokens, always within `0..=capacity`.
    tokens: AtomicU64,

    /// Last refill timestamp (nanoseconds since creation).
    last_updated_nanos: AtomicU64,

    /// Creation instant for time calculations.
    created_at: Instant,
}

impl TokenBucket {
    /// Create a full token bucket.
    #[must_use]
    pub fn new(capacity: u64, rate: f64) -> Self {
        Self {
            capacity,
            rate,
            tokens: AtomicU64::new(capacity),
            last_updated_nanos: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Try to take one token.
    ///
    /// Returns `true` if a token was taken. An empty bucket is left untouched.
    pub fn try_consume(&self) -> bool {
        let mut current = self.tokens.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }

            match self.tokens.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Get current token count.
    #[must_use]
    pub fn available_tokens(&self) -> u64 {
        self.tokens.load(Ordering::Acquire)
    }

    /// Get the maximum tokens (burst capacity).
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the refill rate (tokens per second).
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Whether the bucket holds its full capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.available_tokens() >= self.capacity
    }

    /// Restore tokens for the time elapsed since the last refill.
    ///
    /// Returns the number of tokens added.
    pub fn refill(&self) -> u64 {
        self.refill_at(Instant::now())
    }

    /// [`TokenBucket::refill`] against an explicit clock reading.
    pub fn refill_at(&self, now: Instant) -> u64 {
        let now_nanos = self.nanos_since_creation(now);
        let last_nanos = self.last_updated_nanos.load(Ordering::Acquire);

        if now_nanos <= last_nanos {
            return 0;
        }

        // A full bucket accrues nothing; restart its window.
        if self.is_full() {
            let _ = self.last_updated_nanos.compare_exchange(
                last_nanos,
                now_nanos,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            return 0;
        }

        let elapsed_secs = (now_nanos - last_nanos) as f64 / NANOS_PER_SEC;
        let tokens_to_add = (elapsed_secs * self.rate) as u64;

        if tokens_to_add == 0 {
            return 0;
        }

        // Advance only by the time that earned whole tokens so the
        // fractional remainder carries into the next tick.
        let earned_nanos = (tokens_to_add as f64 / self.rate * NANOS_PER_SEC) as u64;
        let next_nanos = last_nanos.saturating_add(earned_nanos).min(now_nanos);

        if self
            .last_updated_nanos
            .compare_exchange(last_nanos, next_nanos, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0; // Another thread is handling refill
        }

        // Add tokens up to capacity
        let mut current = self.tokens.load(Ordering::Acquire);
        loop {
            let new_value = current.saturating_add(tokens_to_add).min(self.capacity);

            if current == new_value {
                return 0;
            }

            match self.tokens.compare_exchange_weak(
                current,
                new_value,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return new_value - current,
                Err(actual) => current = actual,
            }
        }
    }

    fn nanos_since_creation(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.created_at).as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Mutable part of a [`LeakyBucket`].
#[derive(Debug)]
struct LeakyState {
    /// Outstanding load, within `0..=capacity`.
    level: u64,
    /// Time of the last admission.
    last_updated: Instant,
}

/// A leaky bucket evaluated lazily on each request.
///
/// Load drains at `rate` units per second. A fresh bucket is empty, so it
/// has room for `capacity` immediate admissions.
#[derive(Debug)]
pub struct LeakyBucket {
    /// Maximum outstanding load.
    capacity: u64,
    /// Units drained per second.
    rate: f64,
    /// Level and timestamp, updated together.
    state: Mutex<LeakyState>,
}

impl LeakyBucket {
    /// Create an empty leaky bucket.
    #[must_use]
    pub fn new(capacity: u64, rate: f64) -> Self {
        Self {
            capacity,
            rate,
            state: Mutex::new(LeakyState {
                level: 0,
                last_updated: Instant::now(),
            }),
        }
    }

    /// Try to add one unit of load.
    pub fn try_admit(&self) -> bool {
        self.try_admit_at(Instant::now())
    }

    /// [`LeakyBucket::try_admit`] against an explicit clock reading.
    ///
    /// A rejection leaves the bucket unchanged.
    pub fn try_admit_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(state.last_updated).as_secs_f64();
        let leaked = (elapsed * self.rate) as u64;
        let level = state.level.saturating_sub(leaked);

        if level + 1 > self.capacity {
            return false;
        }

        state.level = level + 1;
        state.last_updated = now;
        true
    }

    /// Outstanding load as of the last admission.
    #[must_use]
    pub fn level(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .level
    }

    /// Get the capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the drain rate (units per second).
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }
}
