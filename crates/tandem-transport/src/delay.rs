//! Delivery delays and the per-recipient delay queue.

use rand::Rng;

use crate::TransportError;

/// Default lower bound on delivery delay, in ticks.
pub const DEFAULT_MIN_DELAY: u64 = 1;

/// Default upper bound on delivery delay, in ticks.
pub const DEFAULT_MAX_DELAY: u64 = 5;

/// Inclusive range delivery delays are drawn from, uniformly.
///
/// The lower bound is at least one tick: nothing sent during a tick is
/// visible in that same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: u64,
    max: u64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl DelayRange {
    /// Create a range, rejecting zero delays and inverted bounds.
    pub fn new(min: u64, max: u64) -> Result<Self, TransportError> {
        if min == 0 || min > max {
            return Err(TransportError::InvalidDelay { min, max });
        }
        Ok(Self { min, max })
    }

    /// Every message takes exactly `ticks` ticks.
    pub fn fixed(ticks: u64) -> Result<Self, TransportError> {
        Self::new(ticks, ticks)
    }

    pub const fn min(&self) -> u64 {
        self.min
    }

    pub const fn max(&self) -> u64 {
        self.max
    }

    /// Draw a delay.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> u64 {
        rng.gen_range(self.min..=self.max)
    }
}

/// Messages waiting for their delivery tick, for a single recipient.
#[derive(Debug, Clone)]
pub struct DelayQueue<M> {
    entries: Vec<(u64, M)>,
}

impl<M> Default for DelayQueue<M> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<M: PartialEq> DelayQueue<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `message` for delivery at tick `due`.
    ///
    /// An identical message already waiting absorbs this one; returns `false`
    /// in that case.
    pub fn push(&mut self, due: u64, message: M) -> bool {
        if self.contains(&message) {
            return false;
        }
        self.entries.push((due, message));
        true
    }

    /// Remove and return everything due at or before `now`, in scheduling order.
    pub fn take_due(&mut self, now: u64) -> Vec<M> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.entries).into_iter().partition(|(at, _)| *at <= now);
        self.entries = waiting;
        due.into_iter().map(|(_, m)| m).collect()
    }

    pub fn contains(&self, message: &M) -> bool {
        self.entries.iter().any(|(_, m)| m == message)
    }

    /// Earliest scheduled delivery tick.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.iter().map(|(at, _)| *at).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
