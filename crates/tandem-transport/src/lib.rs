//! Tandem Transport - delayed team messaging
//!
//! Each team gets one [`Transport`] connecting its members. Messages are:
//! - Delayed by a uniformly drawn number of ticks (1 to 5 by default)
//! - Deduplicated: a message identical to one still pending for the same
//!   recipient is absorbed
//! - Never visible in the tick they were sent
//!
//! The transport is generic over the message type; anything `Ord + Clone`
//! can travel. Ordering is what makes the mailboxes sets and keeps inbox
//! processing deterministic.
//!
//! # Example
//!
//! ```rust
//! use tandem_grid::AgentId;
//! use tandem_transport::{DelayRange, Transport, TransportConfig};
//!
//! let config = TransportConfig::default().with_delay(DelayRange::fixed(1).unwrap());
//! let mut transport: Transport<&str> = Transport::new([AgentId(0), AgentId(1)], config);
//!
//! transport.broadcast(AgentId(0), "hello").unwrap();
//! transport.flush(0);
//! transport.deliver(1);
//! assert_eq!(transport.take_inbox(AgentId(1)).unwrap(), vec!["hello"]);
//! ```

mod delay;
mod mailbox;
mod transport;

pub use delay::{DelayQueue, DelayRange, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY};
pub use mailbox::Mailbox;
pub use transport::{Transport, TransportConfig, TransportStats};

use tandem_grid::AgentId;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown recipient {0}")]
    UnknownRecipient(AgentId),

    #[error("unknown sender {0}")]
    UnknownSender(AgentId),

    #[error("invalid delay range {min}..={max}: minimum must be at least 1 and not exceed maximum")]
    InvalidDelay { min: u64, max: u64 },
}
