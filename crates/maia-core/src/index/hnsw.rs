//! HNSW (Hierarchical Navigable Small World) vector index.
//!
//! A layered proximity graph for approximate nearest-neighbor search over
//! unit-normalized vectors. Structural decisions (descent, linking, shrink)
//! use Euclidean distance between stored vectors; emitted scores are cosine
//! similarity with the query. Upstream embeddings are unit-normalized, so the
//! two rank identically.
//!
//! Nodes live in an arena indexed by numeric handles; neighbor lists store
//! handles, and an `id -> handle` map sits beside the arena. Persistence
//! renumbers handles back to string IDs.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::RwLock;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::embeddings::{cosine_similarity, euclidean_distance};
use crate::error::{IndexError, Result};
use crate::index::codec;
use crate::index::VectorSearchResult;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Default target neighbor count per node at levels > 0.
pub const DEFAULT_M: usize = 16;

/// Default candidate list size while inserting.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default candidate list size during query.
pub const DEFAULT_EF_SEARCH: usize = 50;

/// Default PRNG seed for level draws. Identical insert order yields an
/// identical structure.
pub const DEFAULT_SEED: u64 = 42;

/// Configuration for the HNSW index.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Vector dimension
    pub dimension: usize,
    /// Target neighbor count per node at levels > 0; the level-0 cap is `2 * m`
    pub m: usize,
    /// Candidate list size while inserting
    pub ef_construction: usize,
    /// Candidate list size during query
    pub ef_search: usize,
    /// PRNG seed for level draws
    pub seed: u64,
}

impl HnswConfig {
    /// Configuration with the given dimension and default parameters.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            seed: DEFAULT_SEED,
        }
    }
}

// ============================================================================
// INTERNAL STATE
// ============================================================================

/// Arena slot handle.
type Handle = u32;

#[derive(Debug, Clone)]
struct Node {
    id: String,
    vector: Vec<f32>,
    level: usize,
    /// neighbors[l] holds the handles linked at level l; len() == level + 1
    neighbors: Vec<Vec<Handle>>,
}

#[derive(Debug)]
struct HnswState {
    closed: bool,
    nodes: Vec<Option<Node>>,
    free: Vec<Handle>,
    handles: HashMap<String, Handle>,
    entry: Option<Handle>,
    max_level: usize,
    rng: StdRng,
}

impl HnswState {
    fn node(&self, h: Handle) -> Option<&Node> {
        self.nodes.get(h as usize).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, h: Handle) -> Option<&mut Node> {
        self.nodes.get_mut(h as usize).and_then(|slot| slot.as_mut())
    }

    fn alloc(&mut self, node: Node) -> Handle {
        if let Some(h) = self.free.pop() {
            self.nodes[h as usize] = Some(node);
            h
        } else {
            self.nodes.push(Some(node));
            (self.nodes.len() - 1) as Handle
        }
    }
}

/// Heap entry ordered by distance, with the handle as a total-order tiebreak.
#[derive(Debug, Clone, Copy)]
struct DistEntry {
    dist: f32,
    handle: Handle,
}

impl PartialEq for DistEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.handle == other.handle
    }
}

impl Eq for DistEntry {}

impl PartialOrd for DistEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.handle.cmp(&other.handle))
    }
}

// ============================================================================
// HNSW INDEX
// ============================================================================

/// HNSW approximate nearest-neighbor index.
///
/// A single reader-writer lock guards the whole structure: searches take the
/// read lock, mutations take the write lock, and every operation fails with
/// [`IndexError::Closed`] once [`HnswIndex::close`] has run.
pub struct HnswIndex {
    dimension: usize,
    m: usize,
    m_max: usize,
    ef_construction: usize,
    ef_search: usize,
    level_mult: f64,
    state: RwLock<HnswState>,
}

impl HnswIndex {
    /// Create an empty index.
    pub fn new(config: HnswConfig) -> Self {
        let m = config.m.max(2);
        Self {
            dimension: config.dimension,
            m,
            m_max: m * 2,
            ef_construction: config.ef_construction.max(1),
            ef_search: config.ef_search.max(1),
            level_mult: 1.0 / (m as f64).ln(),
            state: RwLock::new(HnswState {
                closed: false,
                nodes: Vec::new(),
                free: Vec::new(),
                handles: HashMap::new(),
                entry: None,
                max_level: 0,
                rng: StdRng::seed_from_u64(config.seed),
            }),
        }
    }

    /// Vector dimension of the index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors in the index.
    pub fn size(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state.handles.len())
    }

    /// Whether an ID is present.
    pub fn contains(&self, id: &str) -> Result<bool> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state.handles.contains_key(id))
    }

    /// Return the stored vector for an ID.
    pub fn get(&self, id: &str) -> Result<Vec<f32>> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        let h = *state
            .handles
            .get(id)
            .ok_or_else(|| IndexError::NotFound(id.to_string()))?;
        Ok(state.node(h).map(|n| n.vector.clone()).unwrap_or_default())
    }

    /// Insert a vector under an ID. Re-inserting an existing ID replaces it.
    pub fn add(&self, id: &str, vector: &[f32], cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        let mut state = self.state.write().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }

        if let Some(&existing) = state.handles.get(id) {
            Self::unlink(&mut state, existing);
        }

        let u: f64 = 1.0 - state.rng.r#gen::<f64>();
        let level = (-u.ln() * self.level_mult).floor() as usize;
        trace!(id, level, "hnsw insert");

        let handle = state.alloc(Node {
            id: id.to_string(),
            vector: vector.to_vec(),
            level,
            neighbors: vec![Vec::new(); level + 1],
        });
        state.handles.insert(id.to_string(), handle);

        let Some(entry) = state.entry else {
            state.entry = Some(handle);
            state.max_level = level;
            return Ok(());
        };

        // Greedy descent through the levels above the new node's level.
        let mut ep = entry;
        for lc in ((level + 1)..=state.max_level).rev() {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            ep = Self::greedy_step(&state, vector, ep, lc);
        }

        // Link at each level from min(level, top) down to 0.
        let top = level.min(state.max_level);
        let mut eps = vec![ep];
        for lc in (0..=top).rev() {
            let cap = if lc == 0 { self.m_max } else { self.m };
            let candidates =
                Self::search_layer(&state, vector, &eps, self.ef_construction, lc, cancel)?;
            let selected: Vec<Handle> = candidates
                .iter()
                .take(cap)
                .map(|e| e.handle)
                .filter(|&h| h != handle)
                .collect();

            if let Some(node) = state.node_mut(handle) {
                node.neighbors[lc] = selected.clone();
            }

            for &nb in &selected {
                let over_cap = match state.node_mut(nb) {
                    Some(node) if lc < node.neighbors.len() => {
                        if !node.neighbors[lc].contains(&handle) {
                            node.neighbors[lc].push(handle);
                        }
                        node.neighbors[lc].len() > cap
                    }
                    _ => false,
                };
                if over_cap {
                    Self::shrink_neighbors(&mut state, nb, lc, cap);
                }
            }

            eps = candidates.iter().map(|e| e.handle).collect();
        }

        if level > state.max_level {
            state.entry = Some(handle);
            state.max_level = level;
        }
        Ok(())
    }

    /// Insert a batch of vectors.
    pub fn add_batch(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        cancel: &CancellationToken,
    ) -> Result<()> {
        if ids.is_empty() || vectors.is_empty() {
            return Err(IndexError::EmptyBatch);
        }
        if ids.len() != vectors.len() {
            return Err(IndexError::BatchMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
            });
        }
        for (id, vector) in ids.iter().zip(vectors.iter()) {
            self.add(id, vector, cancel)?;
        }
        Ok(())
    }

    /// Remove an ID. Returns whether it was present.
    pub fn remove(&self, id: &str, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let mut state = self.state.write().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        if !state.handles.contains_key(id) {
            return Ok(false);
        }
        let h = state.handles[id];
        Self::unlink(&mut state, h);
        Ok(true)
    }

    /// Approximate k-nearest-neighbor search.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<VectorSearchResult>> {
        if k == 0 {
            return Err(IndexError::InvalidK(k));
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        let Some(entry) = state.entry else {
            return Ok(Vec::new());
        };

        let mut ep = entry;
        for lc in (1..=state.max_level).rev() {
            ep = Self::greedy_step(&state, query, ep, lc);
        }

        let ef = self.ef_search.max(k);
        let candidates = Self::search_layer(&state, query, &[ep], ef, 0, cancel)?;

        Ok(candidates
            .into_iter()
            .take(k)
            .filter_map(|e| {
                state.node(e.handle).map(|n| VectorSearchResult {
                    id: n.id.clone(),
                    score: cosine_similarity(query, &n.vector),
                    distance: e.dist,
                })
            })
            .collect())
    }

    /// Close the index. All subsequent operations fail with `Closed`.
    /// Idempotent; releases all referenced memory.
    pub fn close(&self) {
        // Recover the guard from a poisoned lock; close must still release
        // the memory.
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if state.closed {
            return;
        }
        state.closed = true;
        state.nodes.clear();
        state.free.clear();
        state.handles.clear();
        state.entry = None;
        state.max_level = 0;
    }

    // ------------------------------------------------------------------
    // Internal algorithm pieces
    // ------------------------------------------------------------------

    /// One greedy level descent: move to any strictly closer neighbor until
    /// no improvement is possible.
    fn greedy_step(state: &HnswState, query: &[f32], start: Handle, level: usize) -> Handle {
        let mut current = start;
        let mut current_dist = state
            .node(current)
            .map(|n| euclidean_distance(query, &n.vector))
            .unwrap_or(f32::INFINITY);

        loop {
            let mut improved = false;
            let neighbors = match state.node(current) {
                Some(n) if level < n.neighbors.len() => n.neighbors[level].clone(),
                _ => break,
            };
            for nb in neighbors {
                if let Some(n) = state.node(nb) {
                    let d = euclidean_distance(query, &n.vector);
                    if d < current_dist {
                        current = nb;
                        current_dist = d;
                        improved = true;
                    }
                }
            }
            if !improved {
                break;
            }
        }
        current
    }

    /// Best-first expansion at one level with a dynamic candidate list of
    /// size `ef`. Returns candidates sorted ascending by distance.
    fn search_layer(
        state: &HnswState,
        query: &[f32],
        entry_points: &[Handle],
        ef: usize,
        level: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<DistEntry>> {
        let mut visited: HashSet<Handle> = HashSet::new();
        // Min-heap of candidates to expand, max-heap of retained results.
        let mut candidates: BinaryHeap<std::cmp::Reverse<DistEntry>> = BinaryHeap::new();
        let mut results: BinaryHeap<DistEntry> = BinaryHeap::new();

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            if let Some(n) = state.node(ep) {
                let e = DistEntry {
                    dist: euclidean_distance(query, &n.vector),
                    handle: ep,
                };
                candidates.push(std::cmp::Reverse(e));
                results.push(e);
            }
        }

        while let Some(std::cmp::Reverse(current)) = candidates.pop() {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if current.dist > worst.dist {
                        break;
                    }
                }
            }

            let neighbors = match state.node(current.handle) {
                Some(n) if level < n.neighbors.len() => n.neighbors[level].clone(),
                _ => continue,
            };
            for nb in neighbors {
                if !visited.insert(nb) {
                    continue;
                }
                let Some(n) = state.node(nb) else { continue };
                let d = euclidean_distance(query, &n.vector);
                let admit = results.len() < ef
                    || results.peek().map(|w| d < w.dist).unwrap_or(true);
                if admit {
                    let e = DistEntry { dist: d, handle: nb };
                    candidates.push(std::cmp::Reverse(e));
                    results.push(e);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<DistEntry> = results.into_iter().collect();
        out.sort();
        Ok(out)
    }

    /// Shrink an over-cap neighbor list, keeping the entries closest to the
    /// node's own vector.
    fn shrink_neighbors(state: &mut HnswState, handle: Handle, level: usize, cap: usize) {
        let (own_vector, list) = match state.node(handle) {
            Some(n) if level < n.neighbors.len() => (n.vector.clone(), n.neighbors[level].clone()),
            _ => return,
        };
        let mut scored: Vec<(Handle, f32)> = list
            .into_iter()
            .filter_map(|nb| {
                state
                    .node(nb)
                    .map(|n| (nb, euclidean_distance(&own_vector, &n.vector)))
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        scored.truncate(cap);
        if let Some(n) = state.node_mut(handle) {
            n.neighbors[level] = scored.into_iter().map(|(h, _)| h).collect();
        }
    }

    /// Remove a node from the arena, every neighbor list it appears in, and
    /// the entry mapping; re-elect the entry node if needed.
    fn unlink(state: &mut HnswState, handle: Handle) {
        let Some(node) = state.nodes[handle as usize].take() else {
            return;
        };
        state.handles.remove(&node.id);
        state.free.push(handle);

        for (level, neighbors) in node.neighbors.iter().enumerate() {
            for &nb in neighbors {
                if let Some(n) = state.node_mut(nb) {
                    if level < n.neighbors.len() {
                        n.neighbors[level].retain(|&h| h != handle);
                    }
                }
            }
        }
        // Back-links may exist that the node's own lists do not mirror after
        // shrinks; sweep the arena to drop any remaining references.
        for slot in state.nodes.iter_mut() {
            if let Some(n) = slot {
                for list in n.neighbors.iter_mut() {
                    list.retain(|&h| h != handle);
                }
            }
        }

        if state.entry == Some(handle) {
            let mut best: Option<(Handle, usize)> = None;
            for (i, slot) in state.nodes.iter().enumerate() {
                if let Some(n) = slot {
                    if best.map(|(_, l)| n.level > l).unwrap_or(true) {
                        best = Some((i as Handle, n.level));
                    }
                }
            }
            match best {
                Some((h, l)) => {
                    state.entry = Some(h);
                    state.max_level = l;
                }
                None => {
                    state.entry = None;
                    state.max_level = 0;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize the index in the MAIA format.
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }

        codec::write_vector_header(w, codec::INDEX_TYPE_HNSW, self.dimension)?;
        w.write_i32::<LittleEndian>(self.m as i32)?;
        w.write_i32::<LittleEndian>(self.m_max as i32)?;
        w.write_i32::<LittleEndian>(self.ef_construction as i32)?;
        w.write_i32::<LittleEndian>(self.ef_search as i32)?;
        w.write_f64::<LittleEndian>(self.level_mult)?;
        w.write_i32::<LittleEndian>(state.max_level as i32)?;

        let entry_id = state
            .entry
            .and_then(|h| state.node(h))
            .map(|n| n.id.as_str())
            .unwrap_or("");
        codec::write_string_i32(w, entry_id)?;

        w.write_i32::<LittleEndian>(state.handles.len() as i32)?;
        for slot in state.nodes.iter() {
            let Some(node) = slot else { continue };
            codec::write_string_i32(w, &node.id)?;
            w.write_i32::<LittleEndian>(node.level as i32)?;
            codec::write_vector(w, &node.vector)?;
            w.write_i32::<LittleEndian>(node.neighbors.len() as i32)?;
            for list in &node.neighbors {
                w.write_i32::<LittleEndian>(list.len() as i32)?;
                for &nb in list {
                    let nb_id = state.node(nb).map(|n| n.id.as_str()).unwrap_or("");
                    codec::write_string_i32(w, nb_id)?;
                }
            }
        }
        debug!(nodes = state.handles.len(), "hnsw index saved");
        Ok(())
    }

    /// Deserialize an index in the MAIA format.
    pub fn load<R: Read>(r: &mut R) -> Result<Self> {
        let (index_type, dimension) = codec::read_vector_header(r)?;
        if index_type != codec::INDEX_TYPE_HNSW {
            return Err(IndexError::InvalidFormat(format!(
                "expected HNSW index type, found {index_type}"
            )));
        }
        Self::load_body(r, dimension)
    }

    /// Deserialize the body after the shared header has been consumed.
    pub(crate) fn load_body<R: Read>(r: &mut R, dimension: usize) -> Result<Self> {
        let m = r.read_i32::<LittleEndian>()?;
        let m_max = r.read_i32::<LittleEndian>()?;
        let ef_construction = r.read_i32::<LittleEndian>()?;
        let ef_search = r.read_i32::<LittleEndian>()?;
        if m <= 0 || m_max <= 0 || ef_construction <= 0 || ef_search <= 0 {
            return Err(IndexError::InvalidFormat(format!(
                "non-positive HNSW parameter: M={m}, M_max={m_max}, ef_construction={ef_construction}, ef_search={ef_search}"
            )));
        }
        let level_mult = r.read_f64::<LittleEndian>()?;
        let max_level = r.read_i32::<LittleEndian>()?;
        if max_level < 0 {
            return Err(IndexError::InvalidFormat(format!(
                "negative max_level {max_level}"
            )));
        }
        let entry_id = codec::read_string_i32(r)?;
        let node_count = r.read_i32::<LittleEndian>()?;
        if node_count < 0 {
            return Err(IndexError::InvalidFormat(format!(
                "negative node count {node_count}"
            )));
        }

        // Pass 1: materialize nodes with empty neighbor lists.
        struct Record {
            neighbor_ids: Vec<Vec<String>>,
        }
        let mut state = HnswState {
            closed: false,
            nodes: Vec::with_capacity(node_count as usize),
            free: Vec::new(),
            handles: HashMap::with_capacity(node_count as usize),
            entry: None,
            max_level: max_level as usize,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
        };
        let mut records = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            let id = codec::read_string_i32(r)?;
            let level = r.read_i32::<LittleEndian>()?;
            if level < 0 {
                return Err(IndexError::InvalidFormat(format!(
                    "negative node level {level}"
                )));
            }
            let vector = codec::read_vector(r)?;
            if vector.len() != dimension {
                return Err(IndexError::InvalidFormat(format!(
                    "node vector of length {} in a dimension-{dimension} index",
                    vector.len()
                )));
            }
            let level_count = r.read_i32::<LittleEndian>()?;
            if level_count < 0 {
                return Err(IndexError::InvalidFormat(format!(
                    "negative neighbor level count {level_count}"
                )));
            }
            let mut neighbor_ids = Vec::with_capacity(level_count as usize);
            for _ in 0..level_count {
                let count = r.read_i32::<LittleEndian>()?;
                if count < 0 {
                    return Err(IndexError::InvalidFormat(format!(
                        "negative neighbor count {count}"
                    )));
                }
                let mut ids = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    ids.push(codec::read_string_i32(r)?);
                }
                neighbor_ids.push(ids);
            }

            let handle = state.alloc(Node {
                id: id.clone(),
                vector,
                level: level as usize,
                neighbors: vec![Vec::new(); level_count as usize],
            });
            state.handles.insert(id, handle);
            records.push(Record { neighbor_ids });
        }

        // Pass 2: resolve string neighbor IDs into handles. Unknown IDs are
        // silently dropped for forward-compatibility with partial states.
        for (i, record) in records.into_iter().enumerate() {
            let resolved: Vec<Vec<Handle>> = record
                .neighbor_ids
                .into_iter()
                .map(|ids| {
                    ids.into_iter()
                        .filter_map(|id| state.handles.get(&id).copied())
                        .collect()
                })
                .collect();
            if let Some(node) = state.node_mut(i as Handle) {
                node.neighbors = resolved;
            }
        }

        if entry_id.is_empty() {
            state.entry = None;
        } else {
            let h = *state.handles.get(&entry_id).ok_or_else(|| {
                IndexError::InvalidFormat(format!("entry node {entry_id:?} not in file"))
            })?;
            state.entry = Some(h);
        }

        debug!(nodes = state.handles.len(), dimension, "hnsw index loaded");
        let m = m as usize;
        Ok(Self {
            dimension,
            m,
            m_max: m_max as usize,
            ef_construction: ef_construction as usize,
            ef_search: ef_search as usize,
            level_mult,
            state: RwLock::new(state),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
