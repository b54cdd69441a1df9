//! Persistent flat vector index over code fragments.
//!
//! Append-only: positions are assigned at insertion time and never reused.
//! The vector rows, the id⇄position maps and the condensed metadata store
//! are one unit, persisted and loaded together. Reads are concurrent,
//! writes exclusive, via an interior read-write lock.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use fragdb_core::types::{
    Filter, Fragment, FragmentId, FragmentMetadataRecord, IndexStats, KindDetails, SearchResult,
};
use fragdb_core::Error;

use crate::persist::{self, IndexPaths};

/// Over-fetch multiplier applied when a filter narrows eligible results.
const FILTER_OVERFETCH: usize = 5;

/// Similarity metric of an index, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    L2,
    InnerProduct,
    Cosine,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::L2 => "l2",
            Metric::InnerProduct => "inner_product",
            Metric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2" => Ok(Metric::L2),
            "ip" | "inner_product" => Ok(Metric::InnerProduct),
            "cosine" => Ok(Metric::Cosine),
            other => Err(Error::InvalidConfig(format!("unknown metric '{other}'"))),
        }
    }
}

struct IndexState {
    /// Row-major vector storage, one `dimension`-sized row per position.
    vectors: Vec<f32>,
    id_to_position: HashMap<FragmentId, usize>,
    position_to_id: Vec<FragmentId>,
    metadata: HashMap<FragmentId, FragmentMetadataRecord>,
}

impl IndexState {
    fn empty() -> Self {
        Self {
            vectors: Vec::new(),
            id_to_position: HashMap::new(),
            position_to_id: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    fn row(&self, position: usize, dimension: usize) -> &[f32] {
        &self.vectors[position * dimension..(position + 1) * dimension]
    }
}

/// The persistent vector index plus metadata store for one index name.
pub struct FragmentIndex {
    index_name: String,
    dimension: usize,
    metric: Metric,
    paths: IndexPaths,
    state: RwLock<IndexState>,
}

impl FragmentIndex {
    /// Open (or create) the index under `data_dir`. A missing or corrupt
    /// persisted state is replaced by an empty index; startup never fails
    /// on bad artifacts.
    pub fn open(
        data_dir: &Path,
        index_name: &str,
        dimension: usize,
        metric: Metric,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig("index dimension must be > 0".to_string()).into());
        }
        let paths = IndexPaths::new(data_dir, index_name);
        let state = match persist::load(&paths, dimension, metric.as_str())? {
            Some(persisted) => {
                info!(
                    index = index_name,
                    vectors = persisted.position_to_id.len(),
                    "loaded persisted index"
                );
                IndexState {
                    vectors: persisted.vectors,
                    id_to_position: persisted.id_to_position,
                    position_to_id: persisted.position_to_id,
                    metadata: persisted.metadata,
                }
            }
            None => {
                debug!(index = index_name, "starting with an empty index");
                IndexState::empty()
            }
        };
        Ok(Self {
            index_name: index_name.to_string(),
            dimension,
            metric,
            paths,
            state: RwLock::new(state),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Add fragments with their embedding vectors. Ids already present and
    /// ids without a supplied vector are skipped (logged), never failing
    /// the batch; a wrong-dimension vector is a hard error. Under the
    /// cosine metric vectors are unit-normalized before storage. The batch
    /// is persisted before returning. Returns the number of new entries.
    pub fn add(
        &self,
        fragments: &[Fragment],
        embeddings: &HashMap<FragmentId, Vec<f32>>,
    ) -> Result<usize> {
        let mut added = 0usize;
        {
            let mut state = self.write_state();
            for fragment in fragments {
                if state.id_to_position.contains_key(&fragment.id) {
                    debug!(id = %fragment.id, "already indexed, skipping");
                    continue;
                }
                let Some(vector) = embeddings.get(&fragment.id) else {
                    warn!(id = %fragment.id, "no embedding supplied, skipping");
                    continue;
                };
                if vector.len() != self.dimension {
                    return Err(Error::DimensionMismatch {
                        expected: self.dimension,
                        actual: vector.len(),
                    }
                    .into());
                }
                let mut row = vector.clone();
                if self.metric == Metric::Cosine && !normalize(&mut row) {
                    warn!(id = %fragment.id, "zero vector cannot be normalized, skipping");
                    continue;
                }

                let position = state.position_to_id.len();
                state.vectors.extend_from_slice(&row);
                state.id_to_position.insert(fragment.id.clone(), position);
                state.position_to_id.push(fragment.id.clone());
                state
                    .metadata
                    .insert(fragment.id.clone(), FragmentMetadataRecord::from_fragment(fragment));
                added += 1;
            }
            if added > 0 {
                info!(index = %self.index_name, added, total = state.position_to_id.len(), "vectors added");
            }
        }
        if added > 0 {
            self.save()?;
        }
        Ok(added)
    }

    /// Exact nearest-entry search by the configured metric. With filters,
    /// a candidate pool of `min(5·k, len)` is scored before filtering so
    /// that `k` results usually survive.
    pub fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filters: Option<&Filter>,
    ) -> Result<Vec<SearchResult>> {
        if query_vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            }
            .into());
        }
        let state = self.read_state();
        let total = state.position_to_id.len();
        if total == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let mut query = query_vector.to_vec();
        if self.metric == Metric::Cosine {
            normalize(&mut query);
        }

        let candidate_k = if filters.is_some() {
            (k * FILTER_OVERFETCH).min(total)
        } else {
            k.min(total)
        };

        let mut scored: Vec<(usize, f32)> = (0..total)
            .map(|position| {
                let row = state.row(position, self.dimension);
                let score = match self.metric {
                    Metric::Cosine | Metric::InnerProduct => dot(row, &query),
                    Metric::L2 => -squared_l2(row, &query),
                };
                (position, score)
            })
            .collect();
        // Descending score, position ascending on ties so ranking is
        // reproducible across runs.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(candidate_k);

        let mut results = Vec::with_capacity(k.min(candidate_k));
        for (position, score) in scored {
            let id = &state.position_to_id[position];
            let Some(record) = state.metadata.get(id) else {
                continue;
            };
            if let Some(filter) = filters {
                if !record.matches(filter) {
                    continue;
                }
            }
            results.push(SearchResult::from_record(id, record, score));
            if results.len() >= k {
                break;
            }
        }
        Ok(results)
    }

    /// The stored vector for a fragment id, for similarity-to-item queries.
    pub fn reconstruct(&self, id: &str) -> Option<Vec<f32>> {
        let state = self.read_state();
        let position = *state.id_to_position.get(id)?;
        Some(state.row(position, self.dimension).to_vec())
    }

    /// Fragments most similar to an already-indexed one, excluding itself.
    /// Unknown ids yield an empty list.
    pub fn similar(&self, id: &str, k: usize) -> Result<Vec<SearchResult>> {
        let Some(vector) = self.reconstruct(id) else {
            return Ok(Vec::new());
        };
        let mut results = self.search(&vector, k + 1, None)?;
        results.retain(|r| r.fragment_id != id);
        results.truncate(k);
        Ok(results)
    }

    /// All fragments recorded for a file path, in insertion order.
    pub fn fragments_by_file(&self, file_path: &str) -> Vec<SearchResult> {
        let state = self.read_state();
        state
            .position_to_id
            .iter()
            .filter_map(|id| {
                let record = state.metadata.get(id)?;
                (record.file_path == file_path).then(|| SearchResult::from_record(id, record, 0.0))
            })
            .collect()
    }

    pub fn get_metadata(&self, id: &str) -> Option<FragmentMetadataRecord> {
        self.read_state().metadata.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read_state().id_to_position.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read_state().position_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of `(id, metadata)` pairs in position order, for the
    /// lexical leg of hybrid retrieval.
    pub fn metadata_snapshot(&self) -> Vec<(FragmentId, FragmentMetadataRecord)> {
        let state = self.read_state();
        state
            .position_to_id
            .iter()
            .filter_map(|id| state.metadata.get(id).map(|r| (id.clone(), r.clone())))
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.read_state();
        let mut fragment_kinds: BTreeMap<String, usize> = BTreeMap::new();
        let mut files: HashSet<&str> = HashSet::new();
        let mut component_names: HashSet<&str> = HashSet::new();
        for record in state.metadata.values() {
            *fragment_kinds.entry(record.kind.to_string()).or_insert(0) += 1;
            if !record.file_path.is_empty() {
                files.insert(record.file_path.as_str());
            }
            if let KindDetails::Component { component_name, .. } = &record.details {
                if !component_name.is_empty() {
                    component_names.insert(component_name.as_str());
                }
            }
        }
        IndexStats {
            vector_count: state.position_to_id.len(),
            dimension: self.dimension,
            metric: self.metric.to_string(),
            fragment_kinds,
            file_count: files.len(),
            component_count: component_names.len(),
        }
    }

    /// Persist the three artifacts under a read lock, so concurrent
    /// searches proceed while writers are excluded and the snapshot is
    /// consistent.
    pub fn save(&self) -> Result<()> {
        let state = self.read_state();
        persist::save(
            &self.paths,
            self.dimension,
            self.metric.as_str(),
            &state.vectors,
            &state.id_to_position,
            &state.position_to_id,
            &state.metadata,
        )
    }

    /// Drop all in-memory state and remove the persisted artifacts.
    pub fn clear(&self) {
        let mut state = self.write_state();
        *state = IndexState::empty();
        self.paths.remove_all();
        info!(index = %self.index_name, "index cleared");
    }

    pub fn artifact_paths(&self) -> &IndexPaths {
        &self.paths
    }

    fn read_state(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// In-place L2 normalization; false when the vector has zero norm.
fn normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}
