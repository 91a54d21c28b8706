//! Graph Index
//!
//! In-memory directed multi-relation graph over memory IDs with weighted
//! edges and bounded BFS traversal. Edges are uniquely keyed by
//! `(source, target, relation)`; a second insert updates weight and metadata
//! in place. Twin adjacency lists (outgoing and incoming) plus a node set are
//! kept mutually consistent under a single reader-writer lock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Read, Write};
use std::sync::RwLock;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::index::codec;

// ============================================================================
// RELATIONS
// ============================================================================

/// Relationship kinds between memories.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Relation {
    /// Generic association; the default when no relation is given
    #[default]
    RelatedTo,
    /// A references B
    References,
    /// A follows B in time
    Follows,
    /// A was caused by B
    CausedBy,
    /// A is part of B
    PartOf,
    /// A and B describe the same thing
    SameAs,
    /// A was derived from B
    DerivedFrom,
    /// A contains B
    Contains,
    /// Caller-defined relation
    Custom(String),
}

impl Relation {
    /// String representation used in filters and on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Relation::RelatedTo => "related_to",
            Relation::References => "references",
            Relation::Follows => "follows",
            Relation::CausedBy => "caused_by",
            Relation::PartOf => "part_of",
            Relation::SameAs => "same_as",
            Relation::DerivedFrom => "derived_from",
            Relation::Contains => "contains",
            Relation::Custom(s) => s,
        }
    }

    /// Parse from a string name. Empty maps to the default relation;
    /// unknown names become [`Relation::Custom`].
    pub fn parse_name(s: &str) -> Self {
        match s {
            "" | "related_to" => Relation::RelatedTo,
            "references" => Relation::References,
            "follows" => Relation::Follows,
            "caused_by" => Relation::CausedBy,
            "part_of" => Relation::PartOf,
            "same_as" => Relation::SameAs,
            "derived_from" => Relation::DerivedFrom,
            "contains" => Relation::Contains,
            other => Relation::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Relation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Relation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Relation::parse_name(&s))
    }
}

// ============================================================================
// EDGES
// ============================================================================

/// A directed, weighted, labeled edge between two memory IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Source memory ID
    pub source_id: String,
    /// Target memory ID
    pub target_id: String,
    /// Relationship label
    pub relation: Relation,
    /// Edge weight, clamped to [0, 1] on insert
    pub weight: f32,
    /// String metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Stamped at insert time when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Edge {
    /// Create an edge with no metadata.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation: Relation,
        weight: f32,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation,
            weight,
            metadata: HashMap::new(),
            created_at: None,
        }
    }

    /// Validate and normalize: IDs must be non-empty, weight is clamped to
    /// [0, 1], and a missing `created_at` is stamped now.
    fn validate(&mut self) -> Result<()> {
        if self.source_id.is_empty() {
            return Err(IndexError::InvalidEdge("empty source id".to_string()));
        }
        if self.target_id.is_empty() {
            return Err(IndexError::InvalidEdge("empty target id".to_string()));
        }
        self.weight = self.weight.clamp(0.0, 1.0);
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
        Ok(())
    }
}

// ============================================================================
// TRAVERSAL OPTIONS AND RESULTS
// ============================================================================

/// Which adjacency list(s) a traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow edges source-to-target
    Outgoing,
    /// Follow edges target-to-source
    Incoming,
    /// Follow both
    #[default]
    Both,
}

/// Options bounding a BFS traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraverseOptions {
    /// Direction to walk edges in
    pub direction: Direction,
    /// Maximum hop count; 0 emits nothing (start-only)
    pub max_depth: usize,
    /// Maximum number of emitted results
    pub max_results: usize,
    /// Minimum edge weight; edges below it are not crossed
    pub min_weight: f32,
    /// Record the full path from the start node per result
    pub include_path: bool,
    /// Relation allow-list; empty means all relations pass
    pub relations: Vec<Relation>,
}

impl Default for TraverseOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Both,
            max_depth: 3,
            max_results: 100,
            min_weight: 0.0,
            include_path: false,
            relations: Vec::new(),
        }
    }
}

/// One visited node during traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalResult {
    /// Visited memory ID
    pub id: String,
    /// Hop count from the start node
    pub depth: usize,
    /// Relation of the edge crossed into this node
    pub relation: Relation,
    /// Weight of the edge crossed into this node
    pub weight: f32,
    /// Product of edge weights along the path from the start
    pub cumulative_weight: f32,
    /// Full path from the start, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
}

// ============================================================================
// GRAPH INDEX
// ============================================================================

struct GraphState {
    closed: bool,
    outgoing: HashMap<String, Vec<Edge>>,
    incoming: HashMap<String, Vec<Edge>>,
    nodes: HashSet<String>,
    edge_count: usize,
}

/// Directed property-graph index over memory IDs.
pub struct GraphIndex {
    state: RwLock<GraphState>,
}

impl Default for GraphIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphIndex {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState {
                closed: false,
                outgoing: HashMap::new(),
                incoming: HashMap::new(),
                nodes: HashSet::new(),
                edge_count: 0,
            }),
        }
    }

    /// Number of edges.
    pub fn size(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state.edge_count)
    }

    /// Number of nodes (union of all edge endpoints).
    pub fn node_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state.nodes.len())
    }

    /// Insert or update an edge.
    pub fn add_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation: Relation,
        weight: f32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.add_edge_with_metadata(Edge::new(source_id, target_id, relation, weight), cancel)
    }

    /// Insert or update an edge carrying metadata. `(source, target,
    /// relation)` is the primary key; a second insert replaces weight and
    /// metadata in place.
    pub fn add_edge_with_metadata(&self, mut edge: Edge, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        edge.validate()?;

        let mut guard = self.state.write().map_err(|_| IndexError::Poisoned)?;
        if guard.closed {
            return Err(IndexError::Closed);
        }
        let state = &mut *guard;

        let out = state.outgoing.entry(edge.source_id.clone()).or_default();
        let existing = out
            .iter_mut()
            .find(|e| e.target_id == edge.target_id && e.relation == edge.relation);
        match existing {
            Some(slot) => {
                slot.weight = edge.weight;
                slot.metadata = edge.metadata.clone();
                let inc = state
                    .incoming
                    .entry(edge.target_id.clone())
                    .or_default()
                    .iter_mut()
                    .find(|e| e.source_id == edge.source_id && e.relation == edge.relation);
                if let Some(slot) = inc {
                    slot.weight = edge.weight;
                    slot.metadata = edge.metadata.clone();
                }
            }
            None => {
                out.push(edge.clone());
                state
                    .incoming
                    .entry(edge.target_id.clone())
                    .or_default()
                    .push(edge.clone());
                state.nodes.insert(edge.source_id.clone());
                state.nodes.insert(edge.target_id.clone());
                state.edge_count += 1;
            }
        }
        Ok(())
    }

    /// Remove an edge by its primary key.
    pub fn remove_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation: &Relation,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let mut state = self.state.write().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }

        let removed = match state.outgoing.get_mut(source_id) {
            Some(list) => {
                let before = list.len();
                list.retain(|e| !(e.target_id == target_id && e.relation == *relation));
                before != list.len()
            }
            None => false,
        };
        if !removed {
            return Err(IndexError::EdgeNotFound {
                source_id: source_id.to_string(),
                relation: relation.to_string(),
                target_id: target_id.to_string(),
            });
        }
        if let Some(list) = state.incoming.get_mut(target_id) {
            list.retain(|e| !(e.source_id == source_id && e.relation == *relation));
        }
        state.edge_count -= 1;
        Self::drop_if_orphaned(&mut state, source_id);
        Self::drop_if_orphaned(&mut state, target_id);
        Ok(())
    }

    /// Remove a node and every incident edge. Returns whether the node was
    /// present.
    pub fn remove_node(&self, id: &str, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let mut state = self.state.write().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        if !state.nodes.contains(id) {
            return Ok(false);
        }

        let out = state.outgoing.remove(id).unwrap_or_default();
        let inc = state.incoming.remove(id).unwrap_or_default();
        state.edge_count -= out.len();
        // Self-loops appear in both lists but count once.
        state.edge_count -= inc.iter().filter(|e| e.source_id != id).count();

        let mut touched: HashSet<String> = HashSet::new();
        for e in &out {
            if let Some(list) = state.incoming.get_mut(&e.target_id) {
                list.retain(|x| x.source_id != id);
            }
            touched.insert(e.target_id.clone());
        }
        for e in &inc {
            if let Some(list) = state.outgoing.get_mut(&e.source_id) {
                list.retain(|x| x.target_id != id);
            }
            touched.insert(e.source_id.clone());
        }

        state.nodes.remove(id);
        for other in touched {
            Self::drop_if_orphaned(&mut state, &other);
        }
        Ok(true)
    }

    /// Edges leaving a node, in insertion order.
    pub fn get_outgoing(&self, id: &str) -> Result<Vec<Edge>> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state.outgoing.get(id).cloned().unwrap_or_default())
    }

    /// Edges arriving at a node, in insertion order.
    pub fn get_incoming(&self, id: &str) -> Result<Vec<Edge>> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state.incoming.get(id).cloned().unwrap_or_default())
    }

    /// Whether an edge exists. `relation = None` matches any relation.
    pub fn has_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation: Option<&Relation>,
    ) -> Result<bool> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state
            .outgoing
            .get(source_id)
            .map(|list| {
                list.iter().any(|e| {
                    e.target_id == target_id
                        && relation.map(|r| e.relation == *r).unwrap_or(true)
                })
            })
            .unwrap_or(false))
    }

    /// Single-hop neighbors: a traverse with `max_depth = 1`.
    pub fn get_related(
        &self,
        id: &str,
        opts: &TraverseOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<TraversalResult>> {
        let mut opts = opts.clone();
        opts.max_depth = 1;
        self.traverse(id, &opts, cancel)
    }

    /// Breadth-first traversal from a start node.
    ///
    /// The start node is visited but never emitted. Each other node is
    /// emitted at most once, on first visit, carrying the crossing edge's
    /// relation and weight, a cumulative weight (product along the path),
    /// and optionally the full path from the start. Results are in BFS
    /// visit order.
    pub fn traverse(
        &self,
        start: &str,
        opts: &TraverseOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<TraversalResult>> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }

        let mut results = Vec::new();
        if opts.max_depth == 0 || opts.max_results == 0 {
            return Ok(results);
        }

        struct QueueEntry {
            id: String,
            depth: usize,
            cumulative: f32,
            path: Option<Vec<String>>,
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.to_string());
        let mut queue: VecDeque<QueueEntry> = VecDeque::new();
        queue.push_back(QueueEntry {
            id: start.to_string(),
            depth: 0,
            cumulative: 1.0,
            path: opts.include_path.then(|| vec![start.to_string()]),
        });

        'bfs: while let Some(entry) = queue.pop_front() {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }

            // (neighbor, relation, weight) triples in adjacency order.
            // Incoming edges are logically reversed so the walk continues
            // toward the source.
            let mut steps: Vec<(&Edge, &str)> = Vec::new();
            if matches!(opts.direction, Direction::Outgoing | Direction::Both) {
                if let Some(list) = state.outgoing.get(&entry.id) {
                    steps.extend(list.iter().map(|e| (e, e.target_id.as_str())));
                }
            }
            if matches!(opts.direction, Direction::Incoming | Direction::Both) {
                if let Some(list) = state.incoming.get(&entry.id) {
                    steps.extend(list.iter().map(|e| (e, e.source_id.as_str())));
                }
            }

            for (edge, neighbor) in steps {
                if edge.weight < opts.min_weight {
                    continue;
                }
                if !opts.relations.is_empty() && !opts.relations.contains(&edge.relation) {
                    continue;
                }
                if !visited.insert(neighbor.to_string()) {
                    continue;
                }

                let depth = entry.depth + 1;
                let cumulative = entry.cumulative * edge.weight;
                let path = entry.path.as_ref().map(|p| {
                    let mut p = p.clone();
                    p.push(neighbor.to_string());
                    p
                });
                results.push(TraversalResult {
                    id: neighbor.to_string(),
                    depth,
                    relation: edge.relation.clone(),
                    weight: edge.weight,
                    cumulative_weight: cumulative,
                    path: path.clone(),
                });
                if results.len() >= opts.max_results {
                    break 'bfs;
                }
                if depth < opts.max_depth {
                    queue.push_back(QueueEntry {
                        id: neighbor.to_string(),
                        depth,
                        cumulative,
                        path,
                    });
                }
            }
        }
        Ok(results)
    }

    /// Close the graph. All subsequent operations fail with `Closed`.
    /// Idempotent; releases all referenced memory.
    pub fn close(&self) {
        // Recover the guard from a poisoned lock; close must still release
        // the memory.
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        state.closed = true;
        state.outgoing.clear();
        state.incoming.clear();
        state.nodes.clear();
        state.edge_count = 0;
    }

    fn drop_if_orphaned(state: &mut GraphState, id: &str) {
        let has_out = state.outgoing.get(id).map(|l| !l.is_empty()).unwrap_or(false);
        let has_inc = state.incoming.get(id).map(|l| !l.is_empty()).unwrap_or(false);
        if !has_out {
            state.outgoing.remove(id);
        }
        if !has_inc {
            state.incoming.remove(id);
        }
        if !has_out && !has_inc {
            state.nodes.remove(id);
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize the graph in the MAIG format. Edges are written grouped by
    /// source ID (sorted) for stable bytes.
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }

        codec::write_graph_header(w)?;
        w.write_u32::<LittleEndian>(state.edge_count as u32)?;

        let mut sources: Vec<&String> = state.outgoing.keys().collect();
        sources.sort();
        for src in sources {
            for edge in &state.outgoing[src] {
                codec::write_string_u16(w, &edge.source_id)?;
                codec::write_string_u16(w, &edge.target_id)?;
                codec::write_string_u16(w, edge.relation.as_str())?;
                w.write_f32::<LittleEndian>(edge.weight)?;
                w.write_u16::<LittleEndian>(edge.metadata.len() as u16)?;
                let mut keys: Vec<&String> = edge.metadata.keys().collect();
                keys.sort();
                for key in keys {
                    codec::write_string_u16(w, key)?;
                    codec::write_string_u16(w, &edge.metadata[key])?;
                }
                let nanos = edge
                    .created_at
                    .and_then(|t| t.timestamp_nanos_opt())
                    .unwrap_or(0);
                w.write_i64::<LittleEndian>(nanos)?;
            }
        }
        debug!(edges = state.edge_count, "graph index saved");
        Ok(())
    }

    /// Deserialize a MAIG file, rebuilding both adjacency lists, the node
    /// set, and the edge counter from scratch.
    pub fn load<R: Read>(r: &mut R) -> Result<Self> {
        codec::read_graph_header(r)?;
        let edge_count = r.read_u32::<LittleEndian>()?;

        let mut state = GraphState {
            closed: false,
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            nodes: HashSet::new(),
            edge_count: 0,
        };
        for _ in 0..edge_count {
            let source_id = codec::read_string_u16(r)?;
            let target_id = codec::read_string_u16(r)?;
            let relation = Relation::parse_name(&codec::read_string_u16(r)?);
            let weight = r.read_f32::<LittleEndian>()?;
            let meta_count = r.read_u16::<LittleEndian>()?;
            let mut metadata = HashMap::with_capacity(meta_count as usize);
            for _ in 0..meta_count {
                let key = codec::read_string_u16(r)?;
                let value = codec::read_string_u16(r)?;
                metadata.insert(key, value);
            }
            let nanos = r.read_i64::<LittleEndian>()?;
            let created_at = (nanos != 0).then(|| DateTime::from_timestamp_nanos(nanos));

            if source_id.is_empty() || target_id.is_empty() {
                return Err(IndexError::InvalidFormat(
                    "edge with empty endpoint".to_string(),
                ));
            }
            let edge = Edge {
                source_id: source_id.clone(),
                target_id: target_id.clone(),
                relation,
                weight,
                metadata,
                created_at,
            };
            state.outgoing.entry(source_id.clone()).or_default().push(edge.clone());
            state.incoming.entry(target_id.clone()).or_default().push(edge);
            state.nodes.insert(source_id);
            state.nodes.insert(target_id);
            state.edge_count += 1;
        }
        debug!(edges = state.edge_count, "graph index loaded");
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
