//! Set-semantics mailboxes.

use std::collections::BTreeSet;

/// Pending messages for one recipient.
///
/// A mailbox is a set: inserting a message equal to one already pending is a
/// no-op, so duplicate sends collapse into a single delivery. Draining yields
/// messages in their `Ord` order, which keeps inbox processing deterministic.
#[derive(Debug, Clone)]
pub struct Mailbox<M> {
    pending: BTreeSet<M>,
}

impl<M> Default for Mailbox<M> {
    fn default() -> Self {
        Self {
            pending: BTreeSet::new(),
        }
    }
}

impl<M: Ord> Mailbox<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message. Returns `false` if an equal message was already pending.
    pub fn insert(&mut self, message: M) -> bool {
        self.pending.insert(message)
    }

    pub fn contains(&self, message: &M) -> bool {
        self.pending.contains(message)
    }

    /// Take every pending message.
    pub fn drain(&mut self) -> Vec<M> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse() {
        let mut mailbox = Mailbox::new();
        assert!(mailbox.insert((1, "prepare")));
        assert!(!mailbox.insert((1, "prepare")));
        assert!(mailbox.insert((2, "prepare")));
        assert_eq!(mailbox.len(), 2);
    }

    #[test]
    fn drain_empties_in_order() {
        let mut mailbox = Mailbox::new();
        mailbox.insert(3);
        mailbox.insert(1);
        mailbox.insert(2);
        assert_eq!(mailbox.drain(), vec![1, 2, 3]);
        assert!(mailbox.is_empty());
        // Once consumed, the same message can be delivered again
        assert!(mailbox.insert(1));
    }
}
