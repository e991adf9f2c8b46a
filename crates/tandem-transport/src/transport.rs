//! Delayed, deduplicating message transport for one team.
//!
//! Sends during a tick land in a write buffer. At the end of the tick
//! `flush` moves them into per-recipient delay queues, each stamped with a
//! randomly drawn delivery tick. At the start of a later tick `deliver`
//! moves everything due into the recipients' inboxes, which agents then
//! drain. The two buffers mean an agent never reads a message sent in the
//! tick it is currently processing.

use std::collections::{BTreeMap, BTreeSet};

use rand::{rngs::StdRng, SeedableRng};
use tandem_grid::AgentId;
use tracing::trace;

use crate::{DelayQueue, DelayRange, Mailbox, TransportError};

/// Transport configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Range delivery delays are drawn from
    pub delay: DelayRange,
    /// Seed for the delay generator
    pub seed: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            delay: DelayRange::default(),
            seed: 0,
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn with_delay(mut self, delay: DelayRange) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Running counters, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Messages accepted by `send`/`broadcast`
    pub sent: u64,
    /// Sends absorbed by an identical pending message
    pub collapsed: u64,
    /// Messages placed into inboxes
    pub delivered: u64,
}

/// Message fabric connecting the members of one team.
#[derive(Debug)]
pub struct Transport<M> {
    members: BTreeSet<AgentId>,
    outbox: BTreeMap<AgentId, Mailbox<M>>,
    queues: BTreeMap<AgentId, DelayQueue<M>>,
    inboxes: BTreeMap<AgentId, Mailbox<M>>,
    delay: DelayRange,
    rng: StdRng,
    stats: TransportStats,
}

impl<M: Ord + Clone> Transport<M> {
    /// Create a transport for the given members.
    pub fn new(members: impl IntoIterator<Item = AgentId>, config: TransportConfig) -> Self {
        let members: BTreeSet<AgentId> = members.into_iter().collect();
        let boxes = || members.iter().map(|id| (*id, Mailbox::new())).collect();
        Self {
            outbox: boxes(),
            inboxes: boxes(),
            queues: members.iter().map(|id| (*id, DelayQueue::new())).collect(),
            members,
            delay: config.delay,
            rng: StdRng::seed_from_u64(config.seed),
            stats: TransportStats::default(),
        }
    }

    /// Number of reachable members, the population a quorum is drawn from.
    pub fn live_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, id: AgentId) -> bool {
        self.members.contains(&id)
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Whether an identical message for `to` is anywhere between send and receipt.
    pub fn is_pending(&self, to: AgentId, message: &M) -> bool {
        self.outbox.get(&to).is_some_and(|b| b.contains(message))
            || self.queues.get(&to).is_some_and(|q| q.contains(message))
            || self.inboxes.get(&to).is_some_and(|b| b.contains(message))
    }

    /// Queue `message` for `to`.
    ///
    /// Returns `Ok(false)` when an identical message is still pending for the
    /// same recipient; the send collapses into the existing one.
    pub fn send(&mut self, to: AgentId, message: M) -> Result<bool, TransportError> {
        if !self.is_member(to) {
            return Err(TransportError::UnknownRecipient(to));
        }
        if self.is_pending(to, &message) {
            self.stats.collapsed += 1;
            return Ok(false);
        }
        let outbox = self
            .outbox
            .get_mut(&to)
            .ok_or(TransportError::UnknownRecipient(to))?;
        outbox.insert(message);
        self.stats.sent += 1;
        Ok(true)
    }

    /// Queue `message` for every member except `from`.
    ///
    /// Returns how many copies were queued rather than collapsed.
    pub fn broadcast(&mut self, from: AgentId, message: M) -> Result<usize, TransportError> {
        if !self.is_member(from) {
            return Err(TransportError::UnknownSender(from));
        }
        let recipients: Vec<AgentId> = self.members.iter().copied().filter(|id| *id != from).collect();
        let mut queued = 0;
        for to in recipients {
            if self.send(to, message.clone())? {
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Move this tick's sends into the delay queues. Call once, at tick end.
    pub fn flush(&mut self, now: u64) {
        let mut scheduled = 0usize;
        for (to, outbox) in self.outbox.iter_mut() {
            let Some(queue) = self.queues.get_mut(to) else {
                continue;
            };
            for message in outbox.drain() {
                let due = now.saturating_add(self.delay.sample(&mut self.rng));
                if queue.push(due, message) {
                    scheduled += 1;
                } else {
                    self.stats.collapsed += 1;
                }
            }
        }
        if scheduled > 0 {
            trace!(tick = now, scheduled, "flushed outbox");
        }
    }

    /// Move every message due at or before `now` into its inbox.
    ///
    /// Returns the number of messages placed.
    pub fn deliver(&mut self, now: u64) -> usize {
        let mut placed = 0usize;
        for (to, queue) in self.queues.iter_mut() {
            let Some(inbox) = self.inboxes.get_mut(to) else {
                continue;
            };
            for message in queue.take_due(now) {
                if inbox.insert(message) {
                    placed += 1;
                } else {
                    self.stats.collapsed += 1;
                }
            }
        }
        self.stats.delivered += placed as u64;
        if placed > 0 {
            trace!(tick = now, placed, "delivered messages");
        }
        placed
    }

    /// Drain everything delivered to `id`, in message order.
    pub fn take_inbox(&mut self, id: AgentId) -> Result<Vec<M>, TransportError> {
        self.inboxes
            .get_mut(&id)
            .map(Mailbox::drain)
            .ok_or(TransportError::UnknownRecipient(id))
    }

    /// Messages for `id` scheduled but not yet delivered.
    pub fn in_flight(&self, id: AgentId) -> usize {
        self.queues.get(&id).map_or(0, DelayQueue::len)
    }
}
