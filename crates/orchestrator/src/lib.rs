//! Flow orchestration: the phase executor and the API it exposes.
//!
//! Composes the phase registry, the durable flow store, and the agent
//! crew boundary into the operations the platform's API layer calls:
//! `create_flow`, `execute_phase`, `get_status`, `list_children`,
//! `cancel`, and `resume`.

pub mod error;
pub mod executor;

pub use error::OrchestratorError;
pub use executor::{Orchestrator, PhaseOutcome};
