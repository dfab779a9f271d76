//! Thread-safe Lamport clock implementation.
//!
//! This module contains the LamportClock struct, a monotone scalar logical
//! clock used to stamp every locally originated operation. The clock is the
//! only piece of engine state that may be read from other threads, so all
//! operations go through an atomic counter.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// A scalar logical clock providing a monotone, non-decreasing notion of time.
///
/// Rules:
/// 1. Local event: `tick()` increments the counter and returns the new value.
/// 2. Receive message: `merge(t)` advances the counter to `max(current, t) + 1`,
///    so every identifier generated afterwards dominates the received one.
///
/// # Thread safety
///
/// `tick` and `merge` are lock-free; `merge` uses a compare-and-swap loop so
/// the counter never moves backwards even under concurrent updates.
#[derive(Debug, Default)]
pub struct LamportClock {
    counter: AtomicU64,
}

impl LamportClock {
    /// Creates a new clock starting at time 0.
    pub fn new() -> Self {
        LamportClock {
            counter: AtomicU64::new(0),
        }
    }

    /// Creates a clock starting at a specific value.
    pub fn with_value(value: u64) -> Self {
        LamportClock {
            counter: AtomicU64::new(value),
        }
    }

    /// Returns the current logical time without advancing it.
    pub fn peek(&self) -> u64 {
        self.counter.load(AtomicOrdering::SeqCst)
    }

    /// Advances the clock for a local operation.
    ///
    /// # Returns
    ///
    /// The new timestamp, strictly greater than every previously observed value.
    pub fn tick(&self) -> u64 {
        self.counter.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    /// Updates the clock based on a received timestamp.
    ///
    /// Sets the counter to `max(current, received) + 1` atomically. Called for
    /// every received atom so that causal consistency is preserved.
    pub fn merge(&self, received: u64) {
        let mut current = self.counter.load(AtomicOrdering::SeqCst);
        loop {
            let next = current.max(received) + 1;
            match self.counter.compare_exchange_weak(
                current,
                next,
                AtomicOrdering::SeqCst,
                AtomicOrdering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}
