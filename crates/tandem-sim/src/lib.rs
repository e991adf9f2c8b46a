//! Tandem Simulation
//!
//! Two teams of agents on a grid pick up resource units in pairs and carry
//! them to their deposit box. No agent coordinates the others: partners
//! are chosen by a Paxos round over a delayed transport, then meet,
//! lift, carry and deposit together.
//!
//! # Tick
//!
//! 1. Transports deliver due messages
//! 2. Every agent runs its inbox through the consensus engine
//! 3. Each team, in the configured order, decides against the same world,
//!    then applies its actions in id order
//! 4. The ledger settles pickups, fumbles and deposits
//! 5. Every agent broadcasts its status; sends are queued with a delay
//!
//! Every protocol milestone is recorded as a [`SimEvent`].
//!
//! # Usage
//!
//! ```no_run
//! use tandem_sim::{Simulation, SimulationConfig};
//!
//! let mut sim = Simulation::new(SimulationConfig::default().with_ticks(500))?;
//! let snapshot = sim.run()?;
//! println!("{} events", snapshot.event_count);
//! # Ok::<(), tandem_sim::Error>(())
//! ```

mod agent;
mod config;
mod error;
mod events;
mod ledger;
mod rendezvous;
mod simulation;
mod team;

pub use agent::{Agent, Decision, TaskState};
pub use config::{SimulationConfig, DEFAULT_RENDEZVOUS_WAIT_LIMIT};
pub use error::{Error, Result};
pub use events::{AbandonReason, SimEvent, SimSnapshot, TeamSnapshot};
pub use rendezvous::{step_toward, Observation, Plan};
pub use simulation::{AgentSpawn, Simulation, TickReport, WorldLayout};
pub use team::TeamState;
