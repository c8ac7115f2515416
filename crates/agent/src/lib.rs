//! Agent crew boundary for phase execution.
//!
//! Every phase of a flow is carried out by an agent crew: a unit of work
//! that receives the phase name, the tenant scope, and the successful
//! results of prerequisite phases, and returns a structured outcome. The
//! orchestrator never inspects how a crew produces its result; it only
//! records the response and moves the flow.
//!
//! The LLM-backed crew is strictly a worker. It never decides which phase
//! runs next, whether a flow is complete, or whether a transition is
//! legal. Those are deterministic decisions made by the flow core.

pub mod crew;
pub mod llm;
pub mod testing;

pub use crew::{AgentCrew, CrewOutcome, CrewRequest, CrewResponse, NoopCrew};
pub use llm::{LlmBackedCrew, LlmClient};
