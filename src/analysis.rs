//! Analysis Engine
//!
//! Read-only rankings and aggregates over the store: which capabilities to
//! build next, which workflows are closest to done, and how much of the corpus
//! is covered by implementation and testing.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::entity::{ImplementationStatus, TestType, WorkflowStatus};
use crate::store::EntityStore;

// =============================================================================
// Priority
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityFocus {
    #[default]
    Capability,
    Workflow,
}

impl FromStr for PriorityFocus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "capability" | "capabilities" => Ok(PriorityFocus::Capability),
            "workflow" | "workflows" => Ok(PriorityFocus::Workflow),
            other => Err(format!("unknown priority focus '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityPriority {
    pub id: String,
    pub name: String,
    pub status: ImplementationStatus,
    pub workflows_unblocked: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPriority {
    pub id: String,
    pub name: String,
    pub status: WorkflowStatus,
    /// Implemented share of required capabilities, 1.0 when none are required
    pub readiness: f64,
    pub ready_capabilities: Vec<String>,
    pub outstanding_capabilities: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "focus", rename_all = "lowercase")]
pub enum PriorityReport {
    Capability {
        priorities: Vec<CapabilityPriority>,
        total_unimplemented: usize,
        workflows_blocked: usize,
    },
    Workflow {
        priorities: Vec<WorkflowPriority>,
        total_candidates: usize,
    },
}

/// Rank what to build next. `limit` truncates after ranking.
pub fn suggest_priority(store: &EntityStore, focus: PriorityFocus, limit: Option<usize>) -> PriorityReport {
    match focus {
        PriorityFocus::Capability => capability_priorities(store, limit),
        PriorityFocus::Workflow => workflow_priorities(store, limit),
    }
}

fn capability_priorities(store: &EntityStore, limit: Option<usize>) -> PriorityReport {
    let unimplemented: Vec<_> = store
        .capabilities()
        .filter(|c| c.status != ImplementationStatus::Implemented)
        .collect();
    let pending: BTreeSet<&str> = unimplemented.iter().map(|c| c.id.as_str()).collect();

    let mut priorities: Vec<CapabilityPriority> = unimplemented
        .iter()
        .map(|capability| {
            let requiring: Vec<_> = store
                .workflows()
                .filter(|w| w.requires_capabilities.iter().any(|id| *id == capability.id))
                .collect();
            let unblocked: Vec<String> = requiring.iter().map(|w| w.id.clone()).collect();
            // Counted like any other dependent, but called out in the reasoning
            let finished: Vec<&str> = requiring
                .iter()
                .filter(|w| matches!(w.status, WorkflowStatus::Implemented | WorkflowStatus::Deprecated))
                .map(|w| w.id.as_str())
                .collect();
            let mut reasoning = match unblocked.len() {
                0 => "Not required by any workflow yet".to_string(),
                1 => format!("Required by 1 workflow ({})", unblocked[0]),
                n => format!("Required by {} workflows ({})", n, unblocked.join(", ")),
            };
            if !finished.is_empty() {
                reasoning.push_str(&format!(
                    "; already implemented or deprecated: {}",
                    finished.join(", ")
                ));
            }
            CapabilityPriority {
                id: capability.id.clone(),
                name: capability.name.clone(),
                status: capability.status,
                workflows_unblocked: unblocked,
                reasoning,
            }
        })
        .collect();

    priorities.sort_by(|a, b| {
        b.workflows_unblocked
            .len()
            .cmp(&a.workflows_unblocked.len())
            .then_with(|| a.id.cmp(&b.id))
    });
    if let Some(limit) = limit {
        priorities.truncate(limit);
    }

    let workflows_blocked = store
        .workflows()
        .filter(|w| w.requires_capabilities.iter().any(|id| pending.contains(id.as_str())))
        .count();

    PriorityReport::Capability {
        priorities,
        total_unimplemented: unimplemented.len(),
        workflows_blocked,
    }
}

fn workflow_priorities(store: &EntityStore, limit: Option<usize>) -> PriorityReport {
    let implemented: BTreeSet<&str> = store
        .capabilities()
        .filter(|c| c.status == ImplementationStatus::Implemented)
        .map(|c| c.id.as_str())
        .collect();

    let candidates: Vec<_> = store
        .workflows()
        .filter(|w| w.status != WorkflowStatus::Implemented)
        .collect();

    let mut priorities: Vec<WorkflowPriority> = candidates
        .iter()
        .filter_map(|workflow| {
            let (ready, outstanding): (Vec<String>, Vec<String>) = workflow
                .requires_capabilities
                .iter()
                .cloned()
                .partition(|id| implemented.contains(id.as_str()));
            let total = ready.len() + outstanding.len();
            if total > 0 && ready.is_empty() {
                return None;
            }
            let readiness = if total == 0 { 1.0 } else { ready.len() as f64 / total as f64 };
            let reasoning = if outstanding.is_empty() {
                "All required capabilities are implemented".to_string()
            } else {
                format!(
                    "{}/{} capabilities implemented; waiting on {}",
                    ready.len(),
                    total,
                    outstanding.join(", ")
                )
            };
            Some(WorkflowPriority {
                id: workflow.id.clone(),
                name: workflow.name.clone(),
                status: workflow.status,
                readiness,
                ready_capabilities: ready,
                outstanding_capabilities: outstanding,
                reasoning,
            })
        })
        .collect();

    priorities.sort_by(|a, b| {
        b.readiness
            .partial_cmp(&a.readiness)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.outstanding_capabilities.len().cmp(&b.outstanding_capabilities.len()))
            .then_with(|| a.id.cmp(&b.id))
    });
    if let Some(limit) = limit {
        priorities.truncate(limit);
    }

    PriorityReport::Workflow {
        priorities,
        total_candidates: candidates.len(),
    }
}

// =============================================================================
// Coverage
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaCoverage {
    pub total: usize,
    pub covered: usize,
    pub uncovered: Vec<String>,
}

/// Workflow x persona pairs exercised by test results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCoverage {
    pub total_pairs: usize,
    pub tested_pairs: usize,
    pub untested_pairs: usize,
    pub simulated_pairs: usize,
    pub real_pairs: usize,
    pub passed: usize,
    pub failed: usize,
    /// `(workflow, persona)` combinations with no result
    pub untested: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub capabilities: BTreeMap<String, usize>,
    pub personas: PersonaCoverage,
    pub components: BTreeMap<String, usize>,
    pub workflows: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestCoverage>,
}

fn zeroed(values: &[&str]) -> BTreeMap<String, usize> {
    values.iter().map(|v| (v.to_string(), 0)).collect()
}

pub fn coverage_report(store: &EntityStore) -> CoverageReport {
    let mut capabilities = zeroed(ImplementationStatus::VALUES);
    for capability in store.capabilities() {
        *capabilities.entry(capability.status.to_string()).or_default() += 1;
    }

    let mut components = zeroed(ImplementationStatus::VALUES);
    for component in store.components() {
        *components.entry(component.status.to_string()).or_default() += 1;
    }

    let mut workflows = zeroed(WorkflowStatus::VALUES);
    for workflow in store.workflows() {
        *workflows.entry(workflow.status.to_string()).or_default() += 1;
    }

    let involved: BTreeSet<&str> = store
        .workflows()
        .flat_map(|w| w.personas.iter().map(String::as_str))
        .collect();
    let mut personas = PersonaCoverage::default();
    for persona in store.personas() {
        personas.total += 1;
        if involved.contains(persona.id.as_str()) {
            personas.covered += 1;
        } else {
            personas.uncovered.push(persona.id.clone());
        }
    }

    CoverageReport {
        capabilities,
        personas,
        components,
        workflows,
        tests: test_coverage(store),
    }
}

/// Cross-tab of declared workflow/persona pairs against recorded test results
fn test_coverage(store: &EntityStore) -> Option<TestCoverage> {
    if store.test_results().next().is_none() {
        return None;
    }

    let mut simulated: BTreeSet<(&str, &str)> = BTreeSet::new();
    let mut real: BTreeSet<(&str, &str)> = BTreeSet::new();
    let mut coverage = TestCoverage::default();
    for result in store.test_results() {
        let pair = (result.workflow.as_str(), result.persona.as_str());
        match result.test_type {
            TestType::Simulated => simulated.insert(pair),
            TestType::Real => real.insert(pair),
        };
        if result.passed {
            coverage.passed += 1;
        } else {
            coverage.failed += 1;
        }
    }

    for workflow in store.workflows() {
        for persona in &workflow.personas {
            let pair = (workflow.id.as_str(), persona.as_str());
            coverage.total_pairs += 1;
            let sim = simulated.contains(&pair);
            let live = real.contains(&pair);
            if sim || live {
                coverage.tested_pairs += 1;
            } else {
                coverage.untested_pairs += 1;
                coverage.untested.push((workflow.id.clone(), persona.clone()));
            }
            if sim {
                coverage.simulated_pairs += 1;
            }
            if live {
                coverage.real_pairs += 1;
            }
        }
    }
    Some(coverage)
}
