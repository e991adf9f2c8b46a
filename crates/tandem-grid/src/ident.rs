//! Team and agent identities.

/// Agent identifier, unique within its team and totally ordered.
///
/// Lower identifiers win every tie-break in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentId(pub u32);

impl AgentId {
    /// Greater than any identifier handed out to an agent.
    pub const SENTINEL: Self = Self(u32::MAX);
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::SENTINEL {
            write!(f, "#-")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// The two competing teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub const ALL: [Self; 2] = [Self::Red, Self::Blue];
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Blue => write!(f, "blue"),
        }
    }
}
