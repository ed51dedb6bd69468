//! EVMAuth Sim - simulation adapter
//!
//! Reproduces the ledger's record shapes and lifecycle without a chain:
//! - [`SessionStore`]: one session's agents, bounded payment history and events
//! - [`TimerGroup`]: per-record confirmation timers, cancelled as a group
//! - Background payment synthesis and demo data
//! - Configurable failure injection for payment confirmations
//!
//! # Example
//!
//! ```rust,ignore
//! use evmauth_sim::{SimulationAdapter, SimulationConfig};
//!
//! let sim = SimulationAdapter::start(SimulationConfig::default().with_demo_data(true))?;
//! let agents = sim.list_user_agent_ids(sim.config().owner).await?;
//! sim.shutdown();
//! ```

#![warn(unreachable_pub)]

pub mod adapter;
pub mod config;
pub mod store;
pub mod synth;
pub mod timers;

pub use adapter::SimulationAdapter;
pub use config::{SimulationConfig, DEMO_OWNER};
pub use store::{Resolution, SessionStore};
pub use timers::TimerGroup;
