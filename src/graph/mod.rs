//! Relationship Graph
//!
//! petgraph view over the store's forward references. Nodes are
//! `(EntityType, id)` pairs for every indexed entity; edges carry the
//! [`Relation`] they came from. References whose target is not indexed do not
//! become edges; they are kept aside as [`DanglingReference`]s so the
//! validator can report them.
//!
//! The graph is a snapshot: build it after mutations, not before.

pub mod diagram;
pub mod validate;

pub use diagram::{render_diagram, DiagramFormat, DiagramOptions, FOCUS_ALL};
pub use validate::{
    find_gaps, find_orphans, validate, CategoryCoverage, GapReport, OrphanReport, ValidationReport,
};

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::entity::{EntityType, Relation};
use crate::store::EntityStore;

/// Graph node key
pub type NodeKey = (EntityType, String);

/// A forward reference whose target is not in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub owner_type: EntityType,
    pub owner_id: String,
    pub relation: &'static Relation,
    pub target_id: String,
}

/// Nodes and edges reached from a focus entity
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    pub nodes: BTreeSet<NodeIndex>,
    pub edges: BTreeSet<EdgeIndex>,
}

/// Directed graph of every resolved forward reference in the store
pub struct RelationshipGraph {
    pub(crate) graph: DiGraph<NodeKey, &'static Relation>,
    node_indices: HashMap<NodeKey, NodeIndex>,
    dangling: Vec<DanglingReference>,
}

impl RelationshipGraph {
    pub fn build(store: &EntityStore) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for entity in store.all() {
            let key = (entity.entity_type(), entity.id().to_string());
            let idx = graph.add_node(key.clone());
            node_indices.insert(key, idx);
        }

        let mut dangling = Vec::new();
        for entity in store.all() {
            let owner_type = entity.entity_type();
            let source = node_indices[&(owner_type, entity.id().to_string())];
            for relation in owner_type.relations() {
                for target_id in entity.forward_refs(relation.field) {
                    match node_indices.get(&(relation.target, target_id.to_string())) {
                        Some(&target) => {
                            graph.add_edge(source, target, relation);
                        }
                        None => dangling.push(DanglingReference {
                            owner_type,
                            owner_id: entity.id().to_string(),
                            relation,
                            target_id: target_id.to_string(),
                        }),
                    }
                }
            }
        }

        Self {
            graph,
            node_indices,
            dangling,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn index_of(&self, entity_type: EntityType, id: &str) -> Option<NodeIndex> {
        self.node_indices.get(&(entity_type, id.to_string())).copied()
    }

    pub fn key(&self, idx: NodeIndex) -> Option<&NodeKey> {
        self.graph.node_weight(idx)
    }

    /// References that point nowhere, in store order
    pub fn dangling(&self) -> &[DanglingReference] {
        &self.dangling
    }

    /// Outgoing edges of an entity as (relation, target)
    pub fn refs_out(&self, entity_type: EntityType, id: &str) -> Vec<(&'static Relation, &NodeKey)> {
        self.directed(entity_type, id, Direction::Outgoing)
    }

    /// Incoming edges of an entity as (relation, source)
    pub fn refs_in(&self, entity_type: EntityType, id: &str) -> Vec<(&'static Relation, &NodeKey)> {
        self.directed(entity_type, id, Direction::Incoming)
    }

    fn directed(&self, entity_type: EntityType, id: &str, direction: Direction) -> Vec<(&'static Relation, &NodeKey)> {
        let Some(idx) = self.index_of(entity_type, id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, direction)
            .filter_map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                self.graph.node_weight(other).map(|key| (*edge.weight(), key))
            })
            .collect()
    }

    /// Number of distinct owners of `owner_type` that reference this entity
    pub fn referrers_of_type(&self, entity_type: EntityType, id: &str, owner_type: EntityType) -> usize {
        self.refs_in(entity_type, id)
            .into_iter()
            .filter(|(_, (t, _))| *t == owner_type)
            .map(|(_, (_, owner))| owner.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Breadth-first walk in both directions, up to `depth` hops from `start`.
    ///
    /// Edges keep their forward direction; only edges actually traversed are
    /// included, so an edge between two nodes on the outer ring is left out.
    pub fn neighborhood(&self, start: NodeIndex, depth: usize) -> Neighborhood {
        let mut hood = Neighborhood::default();
        hood.nodes.insert(start);
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((idx, level)) = queue.pop_front() {
            if level >= depth {
                continue;
            }
            let outgoing = self.graph.edges_directed(idx, Direction::Outgoing).map(|e| (e.id(), e.target()));
            let incoming = self.graph.edges_directed(idx, Direction::Incoming).map(|e| (e.id(), e.source()));
            for (edge, next) in outgoing.chain(incoming) {
                hood.edges.insert(edge);
                if hood.nodes.insert(next) {
                    queue.push_back((next, level + 1));
                }
            }
        }
        hood
    }

    /// Every edge as (source, target, relation)
    pub fn edges(&self) -> impl Iterator<Item = (&NodeKey, &NodeKey, &'static Relation)> {
        self.graph.edge_references().filter_map(move |edge| {
            let source = self.graph.node_weight(edge.source())?;
            let target = self.graph.node_weight(edge.target())?;
            Some((source, target, *edge.weight()))
        })
    }

    pub(crate) fn edge(&self, idx: EdgeIndex) -> Option<(&NodeKey, &NodeKey, &'static Relation)> {
        let (source, target) = self.graph.edge_endpoints(idx)?;
        Some((
            self.graph.node_weight(source)?,
            self.graph.node_weight(target)?,
            *self.graph.edge_weight(idx)?,
        ))
    }
}
