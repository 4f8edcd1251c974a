//! On-disk persistence for [`VectorIndex`].
//!
//! An index is stored as two artifacts in one directory:
//!
//! - `index.bin` – magic `DKVI`, format version (u16), dimensions (u32),
//!   count (u64), then `count × dimensions` little-endian `f32`s.
//! - `index.meta.json` – an [`IndexManifest`] plus the per-position chunk
//!   records.
//!
//! The manifest records the embedding model id and a SHA-256 of the vector
//! block, so a loader can refuse an index built with another model or a
//! vector file that does not belong to the metadata next to it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::document::ChunkRecord;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// File name of the binary vector artifact.
pub const VECTORS_FILE: &str = "index.bin";
/// File name of the metadata artifact.
pub const METADATA_FILE: &str = "index.meta.json";

const MAGIC: [u8; 4] = *b"DKVI";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 8;

/// Header of the metadata artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Binary format version.
    pub format_version: u16,
    /// Model id of the embedder that produced the vectors.
    pub embedding_model: String,
    /// Vector dimensionality.
    pub dimensions: usize,
    /// Number of vectors and records.
    pub count: usize,
    /// Hex SHA-256 of the vector block in `index.bin`.
    pub vectors_sha256: String,
    /// When the index was written.
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    manifest: IndexManifest,
    records: Vec<ChunkRecord>,
}

/// Which artifacts of a persisted index are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactState {
    /// Neither artifact exists; the index must be built.
    Missing,
    /// Only one artifact exists; the other path is reported.
    Partial {
        /// The artifact that is absent.
        missing: PathBuf,
    },
    /// Both artifacts exist.
    Present,
}

/// Inspect `dir` for the two index artifacts.
pub fn artifact_state(dir: &Path) -> ArtifactState {
    let vectors = dir.join(VECTORS_FILE);
    let metadata = dir.join(METADATA_FILE);
    match (vectors.is_file(), metadata.is_file()) {
        (false, false) => ArtifactState::Missing,
        (true, true) => ArtifactState::Present,
        (true, false) => ArtifactState::Partial { missing: metadata },
        (false, true) => ArtifactState::Partial { missing: vectors },
    }
}

fn encode_vectors(vectors: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vectors.len() * 4);
    for value in vectors {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn encode_header(dimensions: usize, count: usize) -> Result<Vec<u8>> {
    let dims = u32::try_from(dimensions).map_err(|_| {
        RagError::IndexFormat(format!("{dimensions} dimensions do not fit the u32 header field"))
    })?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&MAGIC);
    header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    header.extend_from_slice(&dims.to_le_bytes());
    header.extend_from_slice(&(count as u64).to_le_bytes());
    Ok(header)
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Write `bytes` to `path` through a sibling temporary file and a rename.
fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Persist `index` into `dir`, creating the directory if needed.
///
/// The vector file is written first and the metadata file last, each via a
/// temporary file and rename, so a crash never leaves a metadata file that
/// describes vectors which were not written.
pub fn save(index: &VectorIndex, dir: &Path) -> Result<IndexManifest> {
    fs::create_dir_all(dir)?;

    let mut bytes = encode_header(index.dimensions(), index.len())?;
    let block = encode_vectors(index.raw_vectors());
    bytes.extend_from_slice(&block);

    let manifest = IndexManifest {
        format_version: FORMAT_VERSION,
        embedding_model: index.embedding_model().to_string(),
        dimensions: index.dimensions(),
        count: index.len(),
        vectors_sha256: sha256_hex(&block),
        built_at: Utc::now(),
    };
    let metadata = MetadataFile { manifest: manifest.clone(), records: index.records().to_vec() };

    write_replacing(&dir.join(VECTORS_FILE), &bytes)?;
    write_replacing(&dir.join(METADATA_FILE), &serde_json::to_vec_pretty(&metadata)?)?;

    info!(
        dir = %dir.display(),
        count = manifest.count,
        dimensions = manifest.dimensions,
        model = %manifest.embedding_model,
        "index persisted"
    );
    Ok(manifest)
}

/// Read only the manifest of a persisted index.
pub fn read_manifest(dir: &Path) -> Result<IndexManifest> {
    let metadata: MetadataFile = serde_json::from_slice(&fs::read(dir.join(METADATA_FILE))?)?;
    Ok(metadata.manifest)
}

/// Load the index persisted in `dir`, refusing one built by another model.
///
/// # Errors
///
/// - [`RagError::Consistency`] if only one artifact is present, or the
///   vector file disagrees with the manifest (count, dimensions, checksum).
/// - [`RagError::ModelMismatch`] if the index was built with a model other
///   than `expected_model`.
/// - [`RagError::IndexFormat`] if the vector file is malformed.
/// - [`RagError::Io`] if neither artifact exists.
pub fn load(dir: &Path, expected_model: &str) -> Result<VectorIndex> {
    match artifact_state(dir) {
        ArtifactState::Present => {}
        ArtifactState::Partial { missing } => {
            return Err(RagError::Consistency(format!(
                "persisted index in {} is incomplete: {} is missing",
                dir.display(),
                missing.display()
            )));
        }
        ArtifactState::Missing => {
            return Err(RagError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no persisted index in {}", dir.display()),
            )));
        }
    }

    let metadata: MetadataFile = serde_json::from_slice(&fs::read(dir.join(METADATA_FILE))?)?;
    let manifest = metadata.manifest;
    if manifest.embedding_model != expected_model {
        return Err(RagError::ModelMismatch {
            expected: expected_model.to_string(),
            found: manifest.embedding_model,
        });
    }
    if manifest.count != metadata.records.len() {
        return Err(RagError::Consistency(format!(
            "manifest declares {} chunks but {} records are stored",
            manifest.count,
            metadata.records.len()
        )));
    }

    let bytes = fs::read(dir.join(VECTORS_FILE))?;
    let (dimensions, count, block) = parse_vectors_file(&bytes)?;
    if dimensions != manifest.dimensions || count != manifest.count {
        return Err(RagError::Consistency(format!(
            "vector file holds {count}×{dimensions}, manifest declares {}×{}",
            manifest.count, manifest.dimensions
        )));
    }
    if sha256_hex(block) != manifest.vectors_sha256 {
        return Err(RagError::Consistency(
            "vector file checksum does not match the metadata manifest".into(),
        ));
    }

    let vectors = block
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect::<Vec<_>>();

    debug!(dir = %dir.display(), count, dimensions, "index loaded");
    Ok(VectorIndex::from_parts(manifest.embedding_model, dimensions, vectors, metadata.records))
}

/// Validate the header and return `(dimensions, count, vector block)`.
fn parse_vectors_file(bytes: &[u8]) -> Result<(usize, usize, &[u8])> {
    if bytes.len() < HEADER_LEN {
        return Err(RagError::IndexFormat("file too short".into()));
    }
    let (header, block) = bytes.split_at(HEADER_LEN);
    if header[0..4] != MAGIC {
        return Err(RagError::IndexFormat("invalid magic".into()));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FORMAT_VERSION {
        return Err(RagError::IndexFormat(format!("unsupported format version {version}")));
    }
    let dimensions = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[10..18]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let expected = dimensions
        .checked_mul(count)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| RagError::IndexFormat("header sizes overflow".into()))?;
    if block.len() != expected {
        return Err(RagError::IndexFormat(format!(
            "expected {expected} bytes of vectors, found {}",
            block.len()
        )));
    }
    Ok((dimensions, count, block))
}
