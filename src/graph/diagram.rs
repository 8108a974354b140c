//! Diagram Renderer
//!
//! Emits a Mermaid flowchart (default) or Graphviz DOT description of either
//! the whole corpus or the neighborhood of one entity. Rendering never fails:
//! an unknown focus produces a one-line error string instead of a diagram.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;

use super::{NodeKey, RelationshipGraph};
use crate::entity::{EntityType, Relation};
use crate::store::EntityStore;

/// Focus value selecting the whole corpus
pub const FOCUS_ALL: &str = "all";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    #[default]
    Mermaid,
    Dot,
}

impl FromStr for DiagramFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mermaid" | "mmd" => Ok(DiagramFormat::Mermaid),
            "dot" | "graphviz" => Ok(DiagramFormat::Dot),
            other => Err(format!("unknown diagram format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramOptions {
    /// `"all"` or an entity id
    pub focus: String,
    /// Hops from the focus entity
    pub depth: usize,
    pub format: DiagramFormat,
    /// Disambiguates a focus id shared by several types
    pub entity_type: Option<EntityType>,
}

impl Default for DiagramOptions {
    fn default() -> Self {
        Self {
            focus: FOCUS_ALL.to_string(),
            depth: 1,
            format: DiagramFormat::Mermaid,
            entity_type: None,
        }
    }
}

impl DiagramOptions {
    pub fn focus(id: impl Into<String>, depth: usize) -> Self {
        Self {
            focus: id.into(),
            depth,
            ..Self::default()
        }
    }
}

/// Node shown in a diagram
struct DiagramNode<'a> {
    key: &'a NodeKey,
    label: String,
}

/// Edge shown in a diagram, always in its forward direction
struct DiagramEdge<'a> {
    source: &'a NodeKey,
    target: &'a NodeKey,
    relation: &'static Relation,
}

pub fn render_diagram(store: &EntityStore, options: &DiagramOptions) -> String {
    let graph = RelationshipGraph::build(store);
    let label = |key: &NodeKey| {
        let name = store.find(key.0, &key.1).map(|e| e.name()).unwrap_or_default();
        if name.is_empty() || name == key.1 {
            key.1.clone()
        } else {
            format!("{}: {}", key.1, name)
        }
    };

    if options.focus == FOCUS_ALL {
        let nodes: Vec<DiagramNode> = graph
            .graph
            .node_indices()
            .filter_map(|idx| graph.key(idx))
            .map(|key| DiagramNode { key, label: label(key) })
            .collect();
        let edges: Vec<DiagramEdge> = graph
            .edges()
            .map(|(source, target, relation)| DiagramEdge { source, target, relation })
            .collect();
        return match options.format {
            DiagramFormat::Mermaid => mermaid(&nodes, &edges, None),
            DiagramFormat::Dot => dot(&nodes, &edges, None),
        };
    }

    let focus = match options.entity_type {
        Some(t) => store.find(t, &options.focus),
        None => store.resolve(&options.focus),
    };
    let Some(start) = focus.and_then(|e| graph.index_of(e.entity_type(), e.id())) else {
        return match options.entity_type {
            Some(t) => format!("Error: {} '{}' not found", t.display_name(), options.focus),
            None => format!("Error: entity '{}' not found", options.focus),
        };
    };

    let hood = graph.neighborhood(start, options.depth);
    let nodes: Vec<DiagramNode> = hood
        .nodes
        .iter()
        .filter_map(|idx| graph.key(*idx))
        .map(|key| DiagramNode { key, label: label(key) })
        .collect();
    let edges: Vec<DiagramEdge> = hood
        .edges
        .iter()
        .filter_map(|idx| graph.edge(*idx))
        .map(|(source, target, relation)| DiagramEdge { source, target, relation })
        .collect();
    let focus_key = graph.key(start);

    match options.format {
        DiagramFormat::Mermaid => mermaid(&nodes, &edges, focus_key),
        DiagramFormat::Dot => dot(&nodes, &edges, focus_key),
    }
}

// =============================================================================
// Emitters
// =============================================================================

const TYPE_COLORS: [(EntityType, &str); 8] = [
    (EntityType::Workflow, "#2196F3"),
    (EntityType::Capability, "#4CAF50"),
    (EntityType::Persona, "#9C27B0"),
    (EntityType::Component, "#FF9800"),
    (EntityType::Tokens, "#795548"),
    (EntityType::View, "#00BCD4"),
    (EntityType::Interaction, "#F44336"),
    (EntityType::TestResult, "#607D8B"),
];

fn color(entity_type: EntityType) -> &'static str {
    TYPE_COLORS
        .iter()
        .find(|(t, _)| *t == entity_type)
        .map(|(_, c)| *c)
        .unwrap_or("#9E9E9E")
}

/// Identifier safe for both Mermaid and DOT
fn node_id(key: &NodeKey) -> String {
    let id: String = key
        .1
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}", key.0.as_str().replace('-', "_"), id)
}

fn escape(label: &str) -> String {
    label.replace('"', "'")
}

fn present_types(nodes: &[DiagramNode]) -> BTreeSet<EntityType> {
    nodes.iter().map(|n| n.key.0).collect()
}

fn mermaid(nodes: &[DiagramNode], edges: &[DiagramEdge], focus: Option<&NodeKey>) -> String {
    let mut out = String::from("graph LR\n");

    for entity_type in present_types(nodes) {
        let _ = writeln!(out, "  subgraph {}[\"{}\"]", entity_type.dir_name().replace('-', "_"), entity_type.display_name());
        for node in nodes.iter().filter(|n| n.key.0 == entity_type) {
            let _ = writeln!(out, "    {}[\"{}\"]", node_id(node.key), escape(&node.label));
        }
        out.push_str("  end\n");
    }

    for edge in edges {
        let _ = writeln!(
            out,
            "  {} -->|{}| {}",
            node_id(edge.source),
            edge.relation.label,
            node_id(edge.target)
        );
    }

    for entity_type in present_types(nodes) {
        let _ = writeln!(
            out,
            "  classDef {} fill:{},color:#fff",
            entity_type.as_str().replace('-', "_"),
            color(entity_type)
        );
        let members: Vec<String> = nodes
            .iter()
            .filter(|n| n.key.0 == entity_type)
            .map(|n| node_id(n.key))
            .collect();
        let _ = writeln!(out, "  class {} {}", members.join(","), entity_type.as_str().replace('-', "_"));
    }

    if let Some(key) = focus {
        let _ = writeln!(out, "  style {} stroke:#FFD600,stroke-width:3px", node_id(key));
    }
    out
}

fn dot(nodes: &[DiagramNode], edges: &[DiagramEdge], focus: Option<&NodeKey>) -> String {
    let mut out = String::from("digraph Artifacts {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10, fontcolor=\"white\"];\n");
    out.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n\n");

    for entity_type in present_types(nodes) {
        let _ = writeln!(out, "  subgraph cluster_{} {{", entity_type.as_str().replace('-', "_"));
        let _ = writeln!(out, "    label=\"{}\";", entity_type.display_name());
        for node in nodes.iter().filter(|n| n.key.0 == entity_type) {
            let pen = if Some(node.key) == focus { ", penwidth=3, color=\"#FFD600\"" } else { "" };
            let _ = writeln!(
                out,
                "    \"{}\" [label=\"{}\", fillcolor=\"{}\"{}];",
                node_id(node.key),
                escape(&node.label),
                color(entity_type),
                pen
            );
        }
        out.push_str("  }\n");
    }

    out.push('\n');
    for edge in edges {
        let _ = writeln!(
            out,
            "  \"{}\" -> \"{}\" [label=\"{}\"];",
            node_id(edge.source),
            node_id(edge.target),
            edge.relation.label
        );
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationRegistry;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample(tmp: &TempDir) -> EntityStore {
        let mut store = EntityStore::open(tmp.path(), Arc::new(MigrationRegistry::with_builtin())).unwrap();
        store
            .create(EntityType::Capability, json!({"id": "search", "name": "Search \"fast\"", "category": "core"}))
            .unwrap();
        store
            .create(
                EntityType::Workflow,
                json!({"id": "W01", "name": "Find", "category": "core", "goal": "g",
                       "requires_capabilities": ["search"]}),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_whole_corpus_mermaid() {
        let tmp = TempDir::new().unwrap();
        let out = render_diagram(&sample(&tmp), &DiagramOptions::default());
        assert!(out.starts_with("graph LR\n"));
        assert!(out.contains("subgraph workflows[\"Workflow\"]"));
        assert!(out.contains("subgraph capabilities[\"Capability\"]"));
        assert!(out.contains("workflow_W01 -->|requires| capability_search"));
        assert!(out.contains("Search 'fast'"));
    }

    #[test]
    fn test_dot_format() {
        let tmp = TempDir::new().unwrap();
        let options = DiagramOptions {
            format: DiagramFormat::Dot,
            ..DiagramOptions::focus("search", 1)
        };
        let out = render_diagram(&sample(&tmp), &options);
        assert!(out.starts_with("digraph Artifacts {"));
        assert!(out.contains("\"workflow_W01\" -> \"capability_search\" [label=\"requires\"];"));
        assert!(out.contains("penwidth=3"));
    }

    #[test]
    fn test_unknown_focus_is_one_line() {
        let tmp = TempDir::new().unwrap();
        let store = sample(&tmp);
        let out = render_diagram(&store, &DiagramOptions::focus("W99", 1));
        assert_eq!(out, "Error: entity 'W99' not found");

        let typed = DiagramOptions {
            entity_type: Some(EntityType::Persona),
            ..DiagramOptions::focus("search", 1)
        };
        assert_eq!(render_diagram(&store, &typed), "Error: Persona 'search' not found");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("DOT".parse::<DiagramFormat>().unwrap(), DiagramFormat::Dot);
        assert_eq!("mermaid".parse::<DiagramFormat>().unwrap(), DiagramFormat::Mermaid);
        assert!("svg".parse::<DiagramFormat>().is_err());
    }
}
