//! Messages exchanged between teammates.

use tandem_grid::{AgentId, GridCoord};

/// Task an agent is currently pursuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TaskRole {
    #[default]
    None,
    /// Heading to a resource to meet a partner
    Helper,
    /// Jointly carrying a resource home
    Carrier,
}

impl std::fmt::Display for TaskRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Helper => write!(f, "helper"),
            Self::Carrier => write!(f, "carrier"),
        }
    }
}

/// The value a round agrees on: which two agents go after which resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairingValue {
    pub resource: GridCoord,
    pair: (AgentId, AgentId),
}

impl PairingValue {
    /// Build a value; the pair is stored lower id first.
    pub fn new(resource: GridCoord, a: AgentId, b: AgentId) -> Self {
        let pair = if a <= b { (a, b) } else { (b, a) };
        Self { resource, pair }
    }

    pub const fn pair(&self) -> (AgentId, AgentId) {
        self.pair
    }

    pub fn includes(&self, id: AgentId) -> bool {
        self.pair.0 == id || self.pair.1 == id
    }

    /// The member of the pair that is not `id`, if `id` is a member.
    pub fn partner_of(&self, id: AgentId) -> Option<AgentId> {
        if self.pair.0 == id {
            Some(self.pair.1)
        } else if self.pair.1 == id {
            Some(self.pair.0)
        } else {
            None
        }
    }
}

impl std::fmt::Display for PairingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} with {}+{}", self.resource, self.pair.0, self.pair.1)
    }
}

/// An agent's public state, broadcast to teammates every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusReport {
    pub sender: AgentId,
    pub position: GridCoord,
    pub carrying: bool,
    pub role: TaskRole,
    pub goal: Option<GridCoord>,
    /// Tick of emission; receivers keep the newest report per sender
    pub sent_at: u64,
}

impl StatusReport {
    /// Whether the sender can be named as a partner in a new proposal.
    pub fn is_available(&self) -> bool {
        !self.carrying && self.role == TaskRole::None
    }
}

/// Team message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Message {
    Prepare { number: u64, proposer: AgentId },
    Promise { number: u64, from: AgentId },
    Accept { number: u64, value: PairingValue },
    Status(StatusReport),
}

impl Message {
    /// Short kind name for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Prepare { .. } => "prepare",
            Self::Promise { .. } => "promise",
            Self::Accept { .. } => "accept",
            Self::Status(_) => "status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_normalized() {
        let a = PairingValue::new(GridCoord::new(3, 3), AgentId(4), AgentId(1));
        let b = PairingValue::new(GridCoord::new(3, 3), AgentId(1), AgentId(4));
        assert_eq!(a, b);
        assert_eq!(a.pair(), (AgentId(1), AgentId(4)));
    }

    #[test]
    fn partner_lookup() {
        let v = PairingValue::new(GridCoord::new(0, 2), AgentId(0), AgentId(2));
        assert_eq!(v.partner_of(AgentId(0)), Some(AgentId(2)));
        assert_eq!(v.partner_of(AgentId(2)), Some(AgentId(0)));
        assert_eq!(v.partner_of(AgentId(1)), None);
        assert!(v.includes(AgentId(2)));
        assert!(!v.includes(AgentId(1)));
    }

    #[test]
    fn availability() {
        let mut status = StatusReport {
            sender: AgentId(1),
            position: GridCoord::ORIGIN,
            carrying: false,
            role: TaskRole::None,
            goal: None,
            sent_at: 0,
        };
        assert!(status.is_available());
        status.role = TaskRole::Helper;
        assert!(!status.is_available());
        status.role = TaskRole::None;
        status.carrying = true;
        assert!(!status.is_available());
    }

    #[test]
    fn kinds_name_each_variant() {
        let value = PairingValue::new(GridCoord::ORIGIN, AgentId(0), AgentId(1));
        assert_eq!(Message::Prepare { number: 1, proposer: AgentId(0) }.kind(), "prepare");
        assert_eq!(Message::Promise { number: 1, from: AgentId(1) }.kind(), "promise");
        assert_eq!(Message::Accept { number: 1, value }.kind(), "accept");
    }
}
