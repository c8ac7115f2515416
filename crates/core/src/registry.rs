//! Phase Registry
//!
//! Static, data-driven definition of each flow type's phase graph:
//! ordering, dependency edges, optionality, branch conditions, result
//! schemas, and timeout policy. The registry is pure configuration; the
//! orchestration logic consumes it generically and never branches on a
//! flow type in code. Lookups of unknown flow types or phase names are
//! configuration errors, never silently defaulted.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::flow::FlowType;
use crate::errors::ConfigurationError;

/// What happens to a flow whose phase exceeds its execution ceiling.
/// Explicit per flow type: a decommission flow must not silently fail
/// because external archival is slow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutDisposition {
    Fail,
    Pause,
}

/// Condition gating a candidate next phase, evaluated against the
/// completed phase's result payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchCondition {
    /// True when the named boolean field is present and set in the result
    /// payload, e.g. routing to questionnaire generation only when
    /// `gaps_found` is true.
    ResultFlag { field: String },
}

impl BranchCondition {
    pub fn holds(&self, result_payload: &Value) -> bool {
        match self {
            Self::ResultFlag { field } => {
                result_payload.get(field).and_then(Value::as_bool).unwrap_or(false)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextPhase {
    pub phase: String,
    pub when: Option<BranchCondition>,
}

impl NextPhase {
    pub fn unconditional(phase: impl Into<String>) -> Self {
        Self { phase: phase.into(), when: None }
    }

    pub fn when_flag(phase: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            when: Some(BranchCondition::ResultFlag { field: field.into() }),
        }
    }
}

/// Declared shape of a phase's result payload. Crew payloads that do not
/// conform are rejected before persistence so downstream phases never
/// operate on garbage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSchema {
    pub required_fields: Vec<String>,
}

impl ResultSchema {
    pub fn with_fields(fields: &[&str]) -> Self {
        Self { required_fields: fields.iter().map(|field| (*field).to_string()).collect() }
    }

    /// Returns the required fields absent from the payload, empty when the
    /// payload conforms.
    pub fn missing_fields(&self, payload: &Value) -> Vec<String> {
        self.required_fields
            .iter()
            .filter(|field| payload.get(field.as_str()).is_none())
            .cloned()
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    pub order: u32,
    pub depends_on: Vec<String>,
    pub optional: bool,
    pub result_schema: ResultSchema,
    pub next: Vec<NextPhase>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTypeSpec {
    pub flow_type: FlowType,
    pub phase_timeout_secs: u64,
    pub on_timeout: TimeoutDisposition,
    /// Whether a recorded failure of an optional phase keeps the flow
    /// open. Per-flow-type configuration, not a core-wide default.
    pub optional_failure_blocks_completion: bool,
    pub phases: Vec<PhaseSpec>,
}

impl FlowTypeSpec {
    pub fn phase(&self, name: &str) -> Option<&PhaseSpec> {
        self.phases.iter().find(|phase| phase.name == name)
    }

    pub fn start_phase(&self) -> &PhaseSpec {
        // Validated non-empty and sorted by order at registry construction.
        &self.phases[0]
    }

    pub fn optional_phases(&self) -> Vec<String> {
        self.phases
            .iter()
            .filter(|phase| phase.optional)
            .map(|phase| phase.name.clone())
            .collect()
    }
}

/// Per-process registry mapping flow types to their validated phase
/// graphs. Explicitly constructed and injected; read-only at runtime.
#[derive(Clone, Debug)]
pub struct PhaseRegistry {
    specs: HashMap<FlowType, FlowTypeSpec>,
}

impl PhaseRegistry {
    pub fn new(specs: Vec<FlowTypeSpec>) -> Result<Self, ConfigurationError> {
        let mut validated = HashMap::with_capacity(specs.len());

        for mut spec in specs {
            validate_spec(&spec)?;
            spec.phases.sort_by_key(|phase| phase.order);

            if !spec.phases[0].depends_on.is_empty() {
                return Err(ConfigurationError::InvalidRegistry {
                    flow_type: spec.flow_type,
                    reason: format!(
                        "start phase `{}` must not declare dependencies",
                        spec.phases[0].name
                    ),
                });
            }

            validated.insert(spec.flow_type, spec);
        }

        Ok(Self { specs: validated })
    }

    pub fn spec(&self, flow_type: FlowType) -> Result<&FlowTypeSpec, ConfigurationError> {
        self.specs.get(&flow_type).ok_or_else(|| ConfigurationError::UnknownFlowType {
            flow_type: flow_type.as_str().to_string(),
        })
    }

    /// All phases for a flow type, in registry order.
    pub fn get_phases(&self, flow_type: FlowType) -> Result<&[PhaseSpec], ConfigurationError> {
        Ok(&self.spec(flow_type)?.phases)
    }

    /// Case-sensitive lookup. `GAP_ANALYSIS` is not `gap_analysis`; the
    /// mismatch is surfaced, never normalized away.
    pub fn phase(
        &self,
        flow_type: FlowType,
        name: &str,
    ) -> Result<&PhaseSpec, ConfigurationError> {
        self.spec(flow_type)?.phase(name).ok_or_else(|| ConfigurationError::UnknownPhase {
            flow_type,
            phase: name.to_string(),
        })
    }

    pub fn start_phase(&self, flow_type: FlowType) -> Result<&PhaseSpec, ConfigurationError> {
        Ok(self.spec(flow_type)?.start_phase())
    }

    pub fn get_dependencies(
        &self,
        flow_type: FlowType,
        phase: &str,
    ) -> Result<&[String], ConfigurationError> {
        Ok(&self.phase(flow_type, phase)?.depends_on)
    }

    pub fn is_optional(
        &self,
        flow_type: FlowType,
        phase: &str,
    ) -> Result<bool, ConfigurationError> {
        Ok(self.phase(flow_type, phase)?.optional)
    }

    /// Candidate next phases after `phase` completes with `result_payload`.
    ///
    /// Conditional edges whose condition holds take precedence over
    /// unconditional edges; with no matching conditional edge the
    /// unconditional edges apply. An empty set means the graph offers no
    /// automatic continuation from this phase.
    pub fn get_next_candidates(
        &self,
        flow_type: FlowType,
        phase: &str,
        result_payload: &Value,
    ) -> Result<Vec<String>, ConfigurationError> {
        let spec = self.phase(flow_type, phase)?;

        let matching_conditional: Vec<String> = spec
            .next
            .iter()
            .filter(|edge| edge.when.as_ref().is_some_and(|when| when.holds(result_payload)))
            .map(|edge| edge.phase.clone())
            .collect();

        if !matching_conditional.is_empty() {
            return Ok(matching_conditional);
        }

        Ok(spec
            .next
            .iter()
            .filter(|edge| edge.when.is_none())
            .map(|edge| edge.phase.clone())
            .collect())
    }
}

fn validate_spec(spec: &FlowTypeSpec) -> Result<(), ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidRegistry {
        flow_type: spec.flow_type,
        reason,
    };

    if spec.phases.is_empty() {
        return Err(invalid("flow type declares no phases".to_string()));
    }
    if spec.phase_timeout_secs == 0 {
        return Err(invalid("phase_timeout_secs must be greater than zero".to_string()));
    }

    let mut names = HashSet::new();
    for phase in &spec.phases {
        if !names.insert(phase.name.as_str()) {
            return Err(invalid(format!("duplicate phase name `{}`", phase.name)));
        }
    }

    for phase in &spec.phases {
        for dependency in &phase.depends_on {
            if !names.contains(dependency.as_str()) {
                return Err(invalid(format!(
                    "phase `{}` depends on unknown phase `{dependency}`",
                    phase.name
                )));
            }
            if dependency == &phase.name {
                return Err(invalid(format!("phase `{}` depends on itself", phase.name)));
            }
        }
        for edge in &phase.next {
            if !names.contains(edge.phase.as_str()) {
                return Err(invalid(format!(
                    "phase `{}` routes to unknown phase `{}`",
                    phase.name, edge.phase
                )));
            }
        }
    }

    detect_dependency_cycle(spec).map_err(invalid)
}

/// Kahn's algorithm over the dependency edges; leftover nodes mean a cycle.
fn detect_dependency_cycle(spec: &FlowTypeSpec) -> Result<(), String> {
    let mut in_degree: HashMap<&str, usize> =
        spec.phases.iter().map(|phase| (phase.name.as_str(), phase.depends_on.len())).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for phase in &spec.phases {
        for dependency in &phase.depends_on {
            dependents.entry(dependency.as_str()).or_default().push(phase.name.as_str());
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut resolved = 0usize;

    while let Some(name) = ready.pop() {
        resolved += 1;
        for &dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(dependent);
                }
            }
        }
    }

    if resolved == spec.phases.len() {
        Ok(())
    } else {
        Err("phase dependency graph contains a cycle".to_string())
    }
}

fn phase(
    name: &str,
    order: u32,
    depends_on: &[&str],
    optional: bool,
    result_fields: &[&str],
    next: Vec<NextPhase>,
) -> PhaseSpec {
    PhaseSpec {
        name: name.to_string(),
        order,
        depends_on: depends_on.iter().map(|dep| (*dep).to_string()).collect(),
        optional,
        result_schema: ResultSchema::with_fields(result_fields),
        next,
    }
}

/// The shipped registry for the five migration flow types.
pub fn default_registry() -> Result<PhaseRegistry, ConfigurationError> {
    PhaseRegistry::new(vec![
        FlowTypeSpec {
            flow_type: FlowType::Discovery,
            phase_timeout_secs: 120,
            on_timeout: TimeoutDisposition::Fail,
            optional_failure_blocks_completion: false,
            phases: vec![
                phase(
                    "data_import",
                    0,
                    &[],
                    false,
                    &["record_count"],
                    vec![NextPhase::unconditional("field_mapping")],
                ),
                phase(
                    "field_mapping",
                    1,
                    &["data_import"],
                    false,
                    &["mapped_fields"],
                    vec![NextPhase::unconditional("data_cleansing")],
                ),
                phase(
                    "data_cleansing",
                    2,
                    &["field_mapping"],
                    false,
                    &["cleansed_records"],
                    vec![NextPhase::unconditional("asset_inventory")],
                ),
                phase(
                    "asset_inventory",
                    3,
                    &["data_cleansing"],
                    false,
                    &["asset_count"],
                    vec![NextPhase::unconditional("dependency_analysis")],
                ),
                phase(
                    "dependency_analysis",
                    4,
                    &["asset_inventory"],
                    true,
                    &["dependency_edges"],
                    vec![NextPhase::unconditional("tech_debt_analysis")],
                ),
                phase("tech_debt_analysis", 5, &["asset_inventory"], true, &["findings"], vec![]),
            ],
        },
        FlowTypeSpec {
            flow_type: FlowType::Collection,
            phase_timeout_secs: 180,
            on_timeout: TimeoutDisposition::Fail,
            optional_failure_blocks_completion: false,
            phases: vec![
                phase(
                    "collection_setup",
                    0,
                    &[],
                    false,
                    &["target_count"],
                    vec![NextPhase::unconditional("tooling_deployment")],
                ),
                phase(
                    "tooling_deployment",
                    1,
                    &["collection_setup"],
                    false,
                    &["deployed_agents"],
                    vec![NextPhase::unconditional("data_collection")],
                ),
                phase(
                    "data_collection",
                    2,
                    &["tooling_deployment"],
                    false,
                    &["collected_metrics"],
                    vec![NextPhase::unconditional("collection_validation")],
                ),
                phase(
                    "collection_validation",
                    3,
                    &["data_collection"],
                    false,
                    &["validated"],
                    vec![NextPhase::unconditional("performance_baseline")],
                ),
                phase(
                    "performance_baseline",
                    4,
                    &["collection_validation"],
                    true,
                    &["baseline_windows"],
                    vec![],
                ),
            ],
        },
        FlowTypeSpec {
            flow_type: FlowType::Assessment,
            phase_timeout_secs: 240,
            on_timeout: TimeoutDisposition::Fail,
            optional_failure_blocks_completion: false,
            phases: vec![
                phase(
                    "readiness_scan",
                    0,
                    &[],
                    false,
                    &["scanned_assets"],
                    vec![NextPhase::unconditional("gap_analysis")],
                ),
                phase(
                    "gap_analysis",
                    1,
                    &["readiness_scan"],
                    false,
                    &["gaps_found"],
                    vec![
                        NextPhase::when_flag("questionnaire_generation", "gaps_found"),
                        NextPhase::unconditional("treatment_recommendation"),
                    ],
                ),
                phase(
                    "questionnaire_generation",
                    2,
                    &["gap_analysis"],
                    true,
                    &["questionnaires"],
                    vec![NextPhase::unconditional("treatment_recommendation")],
                ),
                phase(
                    "treatment_recommendation",
                    3,
                    &["gap_analysis"],
                    false,
                    &["recommendations"],
                    vec![],
                ),
            ],
        },
        FlowTypeSpec {
            flow_type: FlowType::Planning,
            phase_timeout_secs: 180,
            on_timeout: TimeoutDisposition::Fail,
            optional_failure_blocks_completion: true,
            phases: vec![
                phase(
                    "scope_definition",
                    0,
                    &[],
                    false,
                    &["in_scope_assets"],
                    vec![NextPhase::unconditional("wave_planning")],
                ),
                phase(
                    "wave_planning",
                    1,
                    &["scope_definition"],
                    false,
                    &["waves"],
                    vec![NextPhase::unconditional("runbook_generation")],
                ),
                phase(
                    "runbook_generation",
                    2,
                    &["wave_planning"],
                    false,
                    &["runbooks"],
                    vec![NextPhase::unconditional("effort_estimation")],
                ),
                phase("effort_estimation", 3, &["wave_planning"], true, &["estimates"], vec![]),
            ],
        },
        FlowTypeSpec {
            flow_type: FlowType::Decommission,
            phase_timeout_secs: 600,
            on_timeout: TimeoutDisposition::Pause,
            optional_failure_blocks_completion: true,
            phases: vec![
                phase(
                    "decommission_plan",
                    0,
                    &[],
                    false,
                    &["systems"],
                    vec![NextPhase::unconditional("data_archival")],
                ),
                phase(
                    "data_archival",
                    1,
                    &["decommission_plan"],
                    false,
                    &["archived_volumes"],
                    vec![NextPhase::unconditional("system_shutdown")],
                ),
                phase(
                    "system_shutdown",
                    2,
                    &["data_archival"],
                    false,
                    &["shutdown_systems"],
                    vec![NextPhase::unconditional("license_reclamation")],
                ),
                phase(
                    "license_reclamation",
                    3,
                    &["system_shutdown"],
                    true,
                    &["reclaimed_licenses"],
                    vec![],
                ),
            ],
        },
    ])
}
