//! Test Scaffold Generation
//!
//! Turns a workflow into a test-file skeleton.
//!
//! Architecture:
//! - ScaffoldPlan: pure projection of one workflow and the entities it names
//! - Emitters: one per test idiom, consuming only the plan
//!
//! Emitters never touch the store; everything they print is resolved into the
//! plan first.

pub mod e2e;
pub mod unit;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entity::{EntityType, StartingState, Workflow};
use crate::store::EntityStore;

/// Placeholder case title when a workflow has no success criteria
pub const NO_CRITERIA_PLACEHOLDER: &str = "no success criteria defined";

// =============================================================================
// Format
// =============================================================================

/// Output idiom
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestFormat {
    /// Unit tests with plain assertions
    #[default]
    Vitest,
    /// Browser tests driving a page
    Playwright,
}

impl TestFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestFormat::Vitest => "vitest",
            TestFormat::Playwright => "playwright",
        }
    }

    /// Suffix for the generated file
    pub fn file_suffix(&self) -> &'static str {
        match self {
            TestFormat::Vitest => "test.ts",
            TestFormat::Playwright => "spec.ts",
        }
    }
}

impl fmt::Display for TestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vitest" | "unit" => Ok(TestFormat::Vitest),
            "playwright" | "e2e" => Ok(TestFormat::Playwright),
            other => Err(format!("unknown test format '{}'", other)),
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Referenced entity as printed in the header comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub id: String,
    /// None when the reference is dangling
    pub name: Option<String>,
}

impl fmt::Display for NamedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.id, name),
            None => write!(f, "{} (missing)", self.id),
        }
    }
}

/// Everything an emitter needs for one workflow
#[derive(Debug, Clone, PartialEq)]
pub struct ScaffoldPlan {
    pub workflow_id: String,
    pub workflow_name: String,
    pub goal: String,
    pub personas: Vec<NamedRef>,
    pub capabilities: Vec<NamedRef>,
    pub starting_state: Option<StartingState>,
    /// One per success criterion, or the placeholder
    pub cases: Vec<String>,
    /// True when `cases` holds only the placeholder
    pub placeholder: bool,
}

impl ScaffoldPlan {
    pub fn from_workflow(store: &EntityStore, workflow: &Workflow) -> Self {
        let resolve = |entity_type: EntityType, ids: &[String]| -> Vec<NamedRef> {
            ids.iter()
                .map(|id| NamedRef {
                    id: id.clone(),
                    name: store.find(entity_type, id).map(|e| e.name().to_string()),
                })
                .collect()
        };

        let cases: Vec<String> = workflow
            .success_criteria
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        let placeholder = cases.is_empty();

        Self {
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            goal: workflow.goal.clone(),
            personas: resolve(EntityType::Persona, &workflow.personas),
            capabilities: resolve(EntityType::Capability, &workflow.requires_capabilities),
            starting_state: workflow.starting_state.clone().filter(|s| !s.is_empty()),
            cases: if placeholder {
                vec![NO_CRITERIA_PLACEHOLDER.to_string()]
            } else {
                cases
            },
            placeholder,
        }
    }

    /// Suite title: `W01: Explore data`
    pub fn suite_name(&self) -> String {
        format!("{}: {}", self.workflow_id, self.workflow_name)
    }

    /// Suggested file name, e.g. `w01-explore-data.test.ts`
    pub fn file_name(&self, format: TestFormat) -> String {
        format!("{}.{}", slug(&self.suite_name()), format.file_suffix())
    }

    /// Block comment shared by both idioms
    pub(crate) fn header(&self) -> String {
        let mut lines = vec![self.suite_name()];
        if !self.goal.trim().is_empty() {
            lines.push(String::new());
            lines.push(format!("Goal: {}", self.goal.trim()));
        }
        if !self.personas.is_empty() {
            lines.push(format!("Personas: {}", join(&self.personas)));
        }
        if !self.capabilities.is_empty() {
            lines.push(format!("Capabilities: {}", join(&self.capabilities)));
        }

        let mut out = String::from("/**\n");
        for line in lines {
            if line.is_empty() {
                out.push_str(" *\n");
            } else {
                out.push_str(&format!(" * {}\n", comment_safe(&line)));
            }
        }
        out.push_str(" */\n");
        out
    }
}

fn join(refs: &[NamedRef]) -> String {
    refs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

// =============================================================================
// Public API
// =============================================================================

/// Scaffold for one workflow; an unknown id yields a one-line error string
pub fn generate_tests(store: &EntityStore, workflow_id: &str, format: TestFormat) -> String {
    let Some(workflow) = store
        .find(EntityType::Workflow, workflow_id)
        .and_then(|e| e.as_workflow())
    else {
        return format!("Error: Workflow '{}' not found", workflow_id);
    };

    let plan = ScaffoldPlan::from_workflow(store, workflow);
    match format {
        TestFormat::Vitest => unit::emit(&plan),
        TestFormat::Playwright => e2e::emit(&plan),
    }
}

// =============================================================================
// Text Helpers
// =============================================================================

/// Single-quoted TypeScript string literal
pub(crate) fn ts_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Text safe inside a `/* */` or `//` comment
pub(crate) fn comment_safe(text: &str) -> String {
    text.replace("*/", "* /").replace(['\n', '\r'], " ")
}

/// Lowercase, dash-separated file stem
pub fn slug(text: &str) -> String {
    let mut out = String::new();
    let mut dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if dash && !out.is_empty() {
                out.push('-');
            }
            dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("W01: Explore data!"), "w01-explore-data");
        assert_eq!(slug("  --  "), "");
    }

    #[test]
    fn test_ts_string_escaping() {
        assert_eq!(ts_string("it's"), "'it\\'s'");
        assert_eq!(ts_string("a\\b\nc"), "'a\\\\b\\nc'");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("e2e".parse::<TestFormat>().unwrap(), TestFormat::Playwright);
        assert_eq!("Vitest".parse::<TestFormat>().unwrap(), TestFormat::Vitest);
        assert_eq!(TestFormat::default(), TestFormat::Vitest);
        assert!("jest".parse::<TestFormat>().is_err());
    }

    #[test]
    fn test_header_comment() {
        let plan = ScaffoldPlan {
            workflow_id: "W01".into(),
            workflow_name: "Explore".into(),
            goal: "Find */ things".into(),
            personas: vec![NamedRef {
                id: "analyst".into(),
                name: Some("Analyst".into()),
            }],
            capabilities: vec![NamedRef {
                id: "gone".into(),
                name: None,
            }],
            starting_state: None,
            cases: vec![NO_CRITERIA_PLACEHOLDER.into()],
            placeholder: true,
        };
        let header = plan.header();
        assert!(header.contains(" * Goal: Find * / things\n"));
        assert!(header.contains("Personas: analyst (Analyst)"));
        assert!(header.contains("Capabilities: gone (missing)"));
        assert_eq!(plan.file_name(TestFormat::Playwright), "w01-explore.spec.ts");
    }
}
