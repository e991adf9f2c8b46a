//! Ballot ordering and deterministic prepare selection.
//!
//! A ballot is the `(proposal number, proposer)` pair carried by `Prepare`.
//! Ballots are totally ordered by priority:
//!
//! ```text
//! a outranks b  ⇔  a.number > b.number
//!                  ∨ (a.number = b.number ∧ a.proposer < b.proposer)
//! ```
//!
//! Higher numbers win; on equal numbers the lower agent identifier wins. No
//! arrival order or wall clock enters the comparison, so every acceptor
//! facing the same prepares picks the same one.

use std::cmp::Ordering;

use tandem_grid::AgentId;

/// A proposal number paired with the agent that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ballot {
    pub number: u64,
    pub proposer: AgentId,
}

impl Ballot {
    /// What an acceptor has promised before any round: outranked by every
    /// real ballot.
    pub const INITIAL: Self = Self {
        number: 0,
        proposer: AgentId::SENTINEL,
    };

    pub const fn new(number: u64, proposer: AgentId) -> Self {
        Self { number, proposer }
    }

    /// Whether an acceptor holding `self` as its promise may promise `incoming`.
    pub fn admits(&self, incoming: &Ballot) -> bool {
        incoming > self
    }
}

impl Default for Ballot {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl Ord for Ballot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| other.proposer.cmp(&self.proposer))
    }
}

impl PartialOrd for Ballot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Ballot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.number, self.proposer)
    }
}

/// Pick the highest-priority ballot among those received in one tick.
pub fn select_best(ballots: impl IntoIterator<Item = Ballot>) -> Option<Ballot> {
    ballots.into_iter().max()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ballot() -> impl Strategy<Value = Ballot> {
        (0u64..8, 0u32..8).prop_map(|(n, p)| Ballot::new(n, AgentId(p)))
    }

    proptest! {
        #[test]
        fn selection_is_order_independent(mut ballots in prop::collection::vec(ballot(), 1..12)) {
            let forward = select_best(ballots.iter().copied());
            ballots.reverse();
            let backward = select_best(ballots.iter().copied());
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn best_is_admitted_over_every_other(ballots in prop::collection::vec(ballot(), 1..12)) {
            let best = select_best(ballots.iter().copied()).unwrap();
            for b in &ballots {
                prop_assert!(*b == best || b.admits(&best));
            }
        }

        #[test]
        fn distinct_ballots_are_strictly_ordered(a in ballot(), b in ballot()) {
            prop_assume!(a != b);
            prop_assert!(a.admits(&b) != b.admits(&a));
        }
    }
}
