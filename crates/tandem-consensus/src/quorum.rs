//! Majority quorum over a team's live members.
//!
//! - 1 member → 1 required (a lone agent promises to itself)
//! - n members → floor(n / 2) + 1 required
//!
//! The proposer's own implicit promise counts toward the quorum.

/// Promises needed before a proposer may broadcast `Accept`.
///
/// # Examples
///
/// ```
/// use tandem_consensus::quorum_size;
///
/// assert_eq!(quorum_size(1), 1);
/// assert_eq!(quorum_size(4), 3);
/// assert_eq!(quorum_size(5), 3);
/// ```
pub const fn quorum_size(live: usize) -> usize {
    live / 2 + 1
}

/// Check if `promises` is strictly more than half of `live`.
pub const fn has_quorum(promises: usize, live: usize) -> bool {
    promises >= quorum_size(live)
}

/// How many more promises a proposer is waiting for.
pub const fn promises_needed(current: usize, live: usize) -> usize {
    quorum_size(live).saturating_sub(current)
}
