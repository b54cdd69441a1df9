//! On-disk layout of one index: a binary vectors blob, a binary id-map
//! blob, and a JSON metadata document, all versioned. The three artifacts
//! are one unit: loading requires all of them, mutually consistent, or the
//! caller starts from an empty index.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use fragdb_core::types::{FragmentId, FragmentMetadataRecord};
use fragdb_core::Error;

pub const VECTORS_FORMAT_VERSION: u32 = 1;
pub const IDMAP_FORMAT_VERSION: u32 = 1;
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Stable artifact paths for an index name under a data directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub vectors: PathBuf,
    pub idmap: PathBuf,
    pub metadata: PathBuf,
}

impl IndexPaths {
    pub fn new(data_dir: &Path, index_name: &str) -> Self {
        Self {
            vectors: data_dir.join("faiss").join(format!("{index_name}.vectors.bin")),
            idmap: data_dir.join("metadata").join(format!("{index_name}.idmap.bin")),
            metadata: data_dir.join("metadata").join(format!("{index_name}.meta.json")),
        }
    }

    pub fn all_exist(&self) -> bool {
        self.vectors.exists() && self.idmap.exists() && self.metadata.exists()
    }

    pub fn remove_all(&self) {
        for path in [&self.vectors, &self.idmap, &self.metadata] {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "artifact removal failed");
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct VectorsBlob {
    version: u32,
    dimension: u32,
    metric: String,
    count: u64,
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct IdMapBlob {
    version: u32,
    id_to_position: HashMap<String, u64>,
    position_to_id: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct MetadataEnvelope {
    schema_version: u32,
    saved_at: String,
    records: BTreeMap<String, FragmentMetadataRecord>,
}

/// A fully validated snapshot read back from disk.
pub struct PersistedState {
    pub vectors: Vec<f32>,
    pub id_to_position: HashMap<FragmentId, usize>,
    pub position_to_id: Vec<FragmentId>,
    pub metadata: HashMap<FragmentId, FragmentMetadataRecord>,
}

/// Write all three artifacts. Each file goes through a temp-file rename so
/// a concurrent loader never observes a torn write.
pub fn save(
    paths: &IndexPaths,
    dimension: usize,
    metric: &str,
    vectors: &[f32],
    id_to_position: &HashMap<FragmentId, usize>,
    position_to_id: &[FragmentId],
    metadata: &HashMap<FragmentId, FragmentMetadataRecord>,
) -> Result<()> {
    let vectors_blob = VectorsBlob {
        version: VECTORS_FORMAT_VERSION,
        dimension: dimension as u32,
        metric: metric.to_string(),
        count: position_to_id.len() as u64,
        data: vectors.to_vec(),
    };
    let idmap_blob = IdMapBlob {
        version: IDMAP_FORMAT_VERSION,
        id_to_position: id_to_position
            .iter()
            .map(|(id, pos)| (id.clone(), *pos as u64))
            .collect(),
        position_to_id: position_to_id.to_vec(),
    };
    let envelope = MetadataEnvelope {
        schema_version: METADATA_SCHEMA_VERSION,
        saved_at: chrono::Utc::now().to_rfc3339(),
        records: metadata.iter().map(|(id, r)| (id.clone(), r.clone())).collect(),
    };

    write_atomic(&paths.vectors, &bincode::serialize(&vectors_blob).map_err(persist_err)?)?;
    write_atomic(&paths.idmap, &bincode::serialize(&idmap_blob).map_err(persist_err)?)?;
    write_atomic(
        &paths.metadata,
        serde_json::to_string_pretty(&envelope).map_err(persist_err)?.as_bytes(),
    )?;
    Ok(())
}

/// Read the three artifacts back. Returns `Ok(None)` — never an error — when
/// anything is missing, unreadable, or mutually inconsistent; the index then
/// starts empty rather than serving partial state.
pub fn load(paths: &IndexPaths, expected_dimension: usize, metric: &str) -> Result<Option<PersistedState>> {
    if !paths.all_exist() {
        return Ok(None);
    }

    let vectors_blob: VectorsBlob = match fs::read(&paths.vectors)
        .map_err(anyhow::Error::from)
        .and_then(|raw| bincode::deserialize(&raw).map_err(anyhow::Error::from))
    {
        Ok(blob) => blob,
        Err(e) => {
            warn!(path = %paths.vectors.display(), error = %e, "unreadable vectors blob, starting empty");
            return Ok(None);
        }
    };
    let idmap_blob: IdMapBlob = match fs::read(&paths.idmap)
        .map_err(anyhow::Error::from)
        .and_then(|raw| bincode::deserialize(&raw).map_err(anyhow::Error::from))
    {
        Ok(blob) => blob,
        Err(e) => {
            warn!(path = %paths.idmap.display(), error = %e, "unreadable id-map blob, starting empty");
            return Ok(None);
        }
    };
    let envelope: MetadataEnvelope = match fs::read_to_string(&paths.metadata)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str(&raw).map_err(anyhow::Error::from))
    {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(path = %paths.metadata.display(), error = %e, "unreadable metadata document, starting empty");
            return Ok(None);
        }
    };

    if let Some(reason) = consistency_error(
        &vectors_blob,
        &idmap_blob,
        &envelope,
        expected_dimension,
        metric,
    ) {
        warn!(reason, "inconsistent persisted index, starting empty");
        return Ok(None);
    }

    let id_to_position = idmap_blob
        .id_to_position
        .into_iter()
        .map(|(id, pos)| (id, pos as usize))
        .collect();
    let metadata = envelope.records.into_iter().collect();
    Ok(Some(PersistedState {
        vectors: vectors_blob.data,
        id_to_position,
        position_to_id: idmap_blob.position_to_id,
        metadata,
    }))
}

fn consistency_error(
    vectors: &VectorsBlob,
    idmap: &IdMapBlob,
    envelope: &MetadataEnvelope,
    expected_dimension: usize,
    metric: &str,
) -> Option<&'static str> {
    if vectors.version != VECTORS_FORMAT_VERSION
        || idmap.version != IDMAP_FORMAT_VERSION
        || envelope.schema_version != METADATA_SCHEMA_VERSION
    {
        return Some("format version mismatch");
    }
    if vectors.dimension as usize != expected_dimension {
        return Some("dimension mismatch");
    }
    if vectors.metric != metric {
        return Some("metric mismatch");
    }
    let count = vectors.count as usize;
    if idmap.position_to_id.len() != count
        || idmap.id_to_position.len() != count
        || envelope.records.len() != count
    {
        return Some("artifact counts disagree");
    }
    if vectors.data.len() != count * expected_dimension {
        return Some("vector payload size disagrees with count");
    }
    for (position, id) in idmap.position_to_id.iter().enumerate() {
        if idmap.id_to_position.get(id).copied() != Some(position as u64) {
            return Some("id maps are not inverse bijections");
        }
        if !envelope.records.contains_key(id) {
            return Some("metadata id set disagrees with id maps");
        }
    }
    None
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Persist(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| Error::Persist(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::Persist(format!("rename into {}: {e}", path.display())))?;
    Ok(())
}

fn persist_err(e: impl std::fmt::Display) -> Error {
    Error::Persist(e.to_string())
}
