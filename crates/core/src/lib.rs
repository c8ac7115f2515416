pub mod completion;
pub mod config;
pub mod domain;
pub mod errors;
pub mod registry;
pub mod validator;

pub use chrono;

pub use completion::CompletionPolicy;
pub use domain::flow::{
    Flow, FlowId, FlowStatus, FlowType, MasterChildLink, PhaseResult, PhaseResultOutcome,
    PhaseTransitionRecord, TransitionId, TransitionOutcome, TransitionTrigger,
};
pub use domain::tenant::{ClientAccountId, EngagementId, MissingTenantContext, TenantContext};
pub use errors::{ConfigurationError, TransitionError};
pub use registry::{
    default_registry, BranchCondition, FlowTypeSpec, NextPhase, PhaseRegistry, PhaseSpec,
    ResultSchema, TimeoutDisposition,
};
pub use validator::{TransitionValidator, ValidatedTransition};
