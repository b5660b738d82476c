//! Durable storage for a built index and its documents.
//!
//! Two artifacts live side by side in the index directory:
//!
//! `vectors.bin`
//!
//! | field     | type         |
//! |-----------|--------------|
//! | magic     | `b"SMDX"`    |
//! | version   | u8           |
//! | metric    | u8           |
//! | dimension | u32 LE       |
//! | count     | u64 LE       |
//! | checksum  | u32 LE, CRC32 of the fields above |
//!
//! followed by `count * dimension` little-endian `f32` values and a trailing
//! CRC32 of those payload bytes.
//!
//! `documents.json`: `{ "version": 1, "vectors_checksum": ..., "embedder": ...,
//! "documents": [...] }`, where `vectors_checksum` is the payload CRC32 of the
//! `vectors.bin` the documents belong to.
//!
//! Both files are written to a temporary file in the same directory, synced
//! and renamed over the destination, so a reader sees either the previous
//! artifact or the complete new one. The two renames are not atomic as a
//! pair; [`IndexStore::load`] uses `vectors_checksum` to reject documents
//! left over from a different save.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use simdex_embeddings::{DistanceMetric, Embedding, EmbeddingStore, VectorIndex};

use crate::error::{Result, RetrievalError};

const MAGIC: &[u8; 4] = b"SMDX";
const FORMAT_VERSION: u8 = 1;
const DOCUMENTS_VERSION: u32 = 1;

/// magic(4) + version(1) + metric(1) + dimension(4) + count(8) + checksum(4)
const HEADER_SIZE: usize = 22;

const VECTORS_FILE: &str = "vectors.bin";
const DOCUMENTS_FILE: &str = "documents.json";

/// On-disk form of the document texts.
#[derive(Debug, Serialize, Deserialize)]
struct DocumentsData {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vectors_checksum: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedder: Option<String>,
    documents: Vec<String>,
}

#[derive(Debug)]
struct Header {
    metric: DistanceMetric,
    dimension: usize,
    count: usize,
}

/// Saves and loads the vector and document artifacts of one index.
pub struct IndexStore {
    /// Directory holding both artifacts.
    base_path: PathBuf,

    /// Embedder signature written on save and checked on load.
    embedder: Option<String>,
}

impl IndexStore {
    /// Create a store rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            embedder: None,
        }
    }

    /// Record `signature` (see `Embedder::signature`) with saved documents
    /// and refuse to load an index saved under a different one.
    pub fn with_embedder(mut self, signature: impl Into<String>) -> Self {
        self.embedder = Some(signature.into());
        self
    }

    /// Create a store in the per-user data directory.
    pub fn default_location() -> Result<Self> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            RetrievalError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not find data directory",
            ))
        })?;

        Ok(Self::new(data_dir.join("simdex").join("index")))
    }

    /// Get the base path of the store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the vector artifact.
    pub fn vectors_path(&self) -> PathBuf {
        self.base_path.join(VECTORS_FILE)
    }

    /// Path of the document artifact.
    pub fn documents_path(&self) -> PathBuf {
        self.base_path.join(DOCUMENTS_FILE)
    }

    /// Check whether both artifacts are present.
    pub fn exists(&self) -> bool {
        self.vectors_path().exists() && self.documents_path().exists()
    }

    /// Persist the index vectors and the store's documents.
    pub fn save(&self, store: &EmbeddingStore, index: &VectorIndex) -> Result<()> {
        if store.size() != index.len() {
            return Err(RetrievalError::StoreIndexMismatch {
                store: store.size(),
                index: index.len(),
            });
        }

        self.save_vectors(index)?;
        self.save_documents(store.documents(), index)?;

        info!(
            "Saved index ({} documents, dimension {}) to {}",
            store.size(),
            index.dimension(),
            self.base_path.display()
        );
        Ok(())
    }

    /// Load both artifacts and check they describe the same corpus.
    pub fn load(&self) -> Result<(EmbeddingStore, VectorIndex)> {
        let (index, checksum) = self.read_vector_file()?;
        let data = self.read_documents_file()?;
        let documents = data.documents;

        if documents.len() != index.len() {
            return Err(RetrievalError::CorruptArtifact(format!(
                "{VECTORS_FILE} holds {} vectors but {DOCUMENTS_FILE} holds {} documents",
                index.len(),
                documents.len()
            )));
        }

        if data.vectors_checksum != Some(checksum) {
            return Err(RetrievalError::CorruptArtifact(format!(
                "{DOCUMENTS_FILE} was not saved with the current {VECTORS_FILE}"
            )));
        }

        match (&self.embedder, data.embedder) {
            (Some(expected), Some(stored)) if *expected != stored => {
                return Err(RetrievalError::EmbedderMismatch {
                    stored,
                    configured: expected.clone(),
                });
            }
            (Some(expected), None) => {
                warn!("Index records no embedder; assuming it was built with {expected}");
            }
            _ => {}
        }

        let store = EmbeddingStore::from_parts(documents, index.vectors().to_vec())?;

        info!(
            "Loaded index ({} documents) from {}",
            store.size(),
            self.base_path.display()
        );
        Ok((store, index))
    }

    /// Write the vector artifact.
    pub fn save_vectors(&self, index: &VectorIndex) -> Result<()> {
        self.write_atomically(&self.vectors_path(), |writer| {
            write_vectors(writer, index)
        })
    }

    /// Write the document artifact, pinned to the vectors of `index`.
    ///
    /// [`IndexStore::load`] only accepts the documents next to a vector file
    /// holding exactly those vectors.
    pub fn save_documents(&self, documents: &[String], index: &VectorIndex) -> Result<()> {
        let data = DocumentsData {
            version: DOCUMENTS_VERSION,
            vectors_checksum: Some(payload_checksum(index)),
            embedder: self.embedder.clone(),
            documents: documents.to_vec(),
        };
        self.write_atomically(&self.documents_path(), |writer| {
            serde_json::to_writer(writer, &data)?;
            Ok(())
        })
    }

    /// Read the vector artifact back into an index.
    pub fn load_vectors(&self) -> Result<VectorIndex> {
        Ok(self.read_vector_file()?.0)
    }

    /// Read the document artifact.
    pub fn load_documents(&self) -> Result<Vec<String>> {
        Ok(self.read_documents_file()?.documents)
    }

    fn read_vector_file(&self) -> Result<(VectorIndex, u32)> {
        let path = self.vectors_path();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let (index, checksum) = read_vectors(&mut BufReader::new(file), file_len)?;

        debug!("Read {} vectors from {}", index.len(), path.display());
        Ok((index, checksum))
    }

    fn read_documents_file(&self) -> Result<DocumentsData> {
        let path = self.documents_path();
        let file = File::open(&path)?;
        let data: DocumentsData = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            RetrievalError::CorruptArtifact(format!("{}: {e}", path.display()))
        })?;

        if data.version > DOCUMENTS_VERSION {
            warn!(
                "Documents version mismatch: found {}, expected {DOCUMENTS_VERSION}",
                data.version
            );
        }

        debug!("Read {} documents from {}", data.documents.len(), path.display());
        Ok(data)
    }

    /// Remove both artifacts if present.
    pub fn delete(&self) -> Result<()> {
        for path in [self.vectors_path(), self.documents_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        info!("Deleted stored index at {}", self.base_path.display());
        Ok(())
    }

    /// Write through a temp file in the destination directory, then rename.
    ///
    /// If `write` or any flush fails the temp file is dropped, which removes
    /// it, and `path` keeps its previous contents.
    fn write_atomically<F>(&self, path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<()>,
    {
        fs::create_dir_all(&self.base_path)?;

        let mut temp = NamedTempFile::new_in(&self.base_path)?;
        {
            let mut writer = BufWriter::new(&mut temp);
            write(&mut writer)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| RetrievalError::Io(e.error))?;

        debug!("Wrote {}", path.display());
        Ok(())
    }
}

fn write_vectors<W: Write>(writer: &mut W, index: &VectorIndex) -> Result<()> {
    let dimension = u32::try_from(index.dimension()).map_err(|_| {
        RetrievalError::CorruptArtifact(format!(
            "dimension {} does not fit the vector file format",
            index.dimension()
        ))
    })?;

    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(MAGIC);
    header[4] = FORMAT_VERSION;
    header[5] = index.metric().tag();
    header[6..10].copy_from_slice(&dimension.to_le_bytes());
    header[10..18].copy_from_slice(&(index.len() as u64).to_le_bytes());
    let checksum = crc32fast::hash(&header[0..18]);
    header[18..22].copy_from_slice(&checksum.to_le_bytes());
    writer.write_all(&header)?;

    for value in index.vectors().iter().flatten() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.write_all(&payload_checksum(index).to_le_bytes())?;

    Ok(())
}

/// CRC32 of the little-endian payload, as stored after the vectors.
fn payload_checksum(index: &VectorIndex) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for value in index.vectors().iter().flatten() {
        hasher.update(&value.to_le_bytes());
    }
    hasher.finalize()
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header> {
    let mut header = [0u8; HEADER_SIZE];
    read_exact_or_corrupt(reader, &mut header, "header")?;

    if &header[0..4] != MAGIC {
        return Err(RetrievalError::CorruptArtifact(
            "vector file has wrong magic bytes".to_string(),
        ));
    }

    let stored = u32::from_le_bytes([header[18], header[19], header[20], header[21]]);
    if stored != crc32fast::hash(&header[0..18]) {
        return Err(RetrievalError::CorruptArtifact(
            "vector file header checksum mismatch".to_string(),
        ));
    }

    let version = header[4];
    if version != FORMAT_VERSION {
        return Err(RetrievalError::CorruptArtifact(format!(
            "unsupported vector file version {version}, expected {FORMAT_VERSION}"
        )));
    }

    let metric = DistanceMetric::from_tag(header[5]).ok_or_else(|| {
        RetrievalError::CorruptArtifact(format!("unknown metric tag {}", header[5]))
    })?;

    let dimension = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[10..18]);
    let count = usize::try_from(u64::from_le_bytes(count_bytes)).map_err(|_| {
        RetrievalError::CorruptArtifact("vector count does not fit in memory".to_string())
    })?;

    Ok(Header {
        metric,
        dimension,
        count,
    })
}

/// Read a vector file of `file_len` bytes, returning the index and its
/// payload checksum.
fn read_vectors<R: Read>(reader: &mut R, file_len: u64) -> Result<(VectorIndex, u32)> {
    let header = read_header(reader)?;
    if header.count == 0 || header.dimension == 0 {
        return Err(RetrievalError::CorruptArtifact(format!(
            "vector file declares {} vectors of dimension {}",
            header.count, header.dimension
        )));
    }

    // Checked before allocating so a forged header cannot request a huge buffer.
    let expected_len = header
        .count
        .checked_mul(header.dimension)
        .and_then(|values| values.checked_mul(4))
        .and_then(|payload| payload.checked_add(HEADER_SIZE + 4))
        .and_then(|len| u64::try_from(len).ok());
    if expected_len != Some(file_len) {
        return Err(RetrievalError::CorruptArtifact(format!(
            "vector file declares {} vectors of dimension {} but holds {file_len} bytes",
            header.count, header.dimension
        )));
    }

    let mut hasher = crc32fast::Hasher::new();
    let mut row = vec![0u8; header.dimension * 4];
    let mut vectors: Vec<Embedding> = Vec::with_capacity(header.count);

    for _ in 0..header.count {
        read_exact_or_corrupt(reader, &mut row, "vector payload")?;
        hasher.update(&row);
        vectors.push(
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        );
    }

    let mut trailer = [0u8; 4];
    read_exact_or_corrupt(reader, &mut trailer, "payload checksum")?;
    let checksum = hasher.finalize();
    if u32::from_le_bytes(trailer) != checksum {
        return Err(RetrievalError::CorruptArtifact(
            "vector payload checksum mismatch".to_string(),
        ));
    }

    let mut extra = [0u8; 1];
    if reader.read(&mut extra)? != 0 {
        return Err(RetrievalError::CorruptArtifact(
            "trailing bytes after vector payload".to_string(),
        ));
    }

    let index = VectorIndex::build_with_metric(vectors, header.metric)?;
    Ok((index, checksum))
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RetrievalError::CorruptArtifact(format!("vector file truncated in {what}"))
        } else {
            RetrievalError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> (EmbeddingStore, VectorIndex) {
        let store = EmbeddingStore::from_parts(
            vec!["first".to_string(), "second".to_string()],
            vec![vec![0.1, -2.5, f32::MIN_POSITIVE], vec![1e-30, 3.0, -0.0]],
        )
        .unwrap();
        let index = store.build_index(DistanceMetric::Euclidean).unwrap();
        (store, index)
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path().join("nested"));
        let (store, index) = sample();

        storage.save(&store, &index).unwrap();
        assert!(storage.exists());

        let (loaded_store, loaded_index) = storage.load().unwrap();
        assert_eq!(loaded_store, store);
        assert_eq!(loaded_index.metric(), DistanceMetric::Euclidean);

        let bits = |index: &VectorIndex| -> Vec<u32> {
            index
                .vectors()
                .iter()
                .flatten()
                .copied()
                .map(f32::to_bits)
                .collect()
        };
        assert_eq!(bits(&loaded_index), bits(&index));
    }

    #[test]
    fn test_artifacts_load_separately() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        let (store, index) = sample();
        storage.save(&store, &index).unwrap();

        assert_eq!(storage.load_documents().unwrap(), store.documents().to_vec());
        assert_eq!(storage.load_vectors().unwrap(), index);
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        let (store, index) = sample();
        storage.save(&store, &index).unwrap();

        storage
            .save_documents(&["only one".to_string()], &index)
            .unwrap();

        assert!(matches!(
            storage.load(),
            Err(RetrievalError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_vectors_from_another_save_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        let store = EmbeddingStore::from_parts(
            vec!["apple".to_string(), "banana".to_string()],
            vec![vec![0.0], vec![10.0]],
        )
        .unwrap();
        let index = store.build_index(DistanceMetric::default()).unwrap();
        storage.save(&store, &index).unwrap();

        // Same count, different vectors: a save cut short after the first rename.
        let swapped = VectorIndex::build(vec![vec![10.0], vec![0.0]]).unwrap();
        storage.save_vectors(&swapped).unwrap();

        assert!(matches!(
            storage.load(),
            Err(RetrievalError::CorruptArtifact(_))
        ));

        storage.save_documents(store.documents(), &swapped).unwrap();
        let (loaded_store, loaded_index) = storage.load().unwrap();
        assert_eq!(loaded_store.documents(), store.documents());
        assert_eq!(loaded_index, swapped);
    }

    #[test]
    fn test_embedder_signature_is_checked() {
        let temp_dir = TempDir::new().unwrap();
        let (store, index) = sample();
        IndexStore::new(temp_dir.path())
            .with_embedder("trigram/384/unit")
            .save(&store, &index)
            .unwrap();

        assert!(
            IndexStore::new(temp_dir.path())
                .with_embedder("trigram/384/unit")
                .load()
                .is_ok()
        );
        assert!(IndexStore::new(temp_dir.path()).load().is_ok());

        let result = IndexStore::new(temp_dir.path())
            .with_embedder("trigram/384/raw")
            .load();
        match result {
            Err(RetrievalError::EmbedderMismatch { stored, configured }) => {
                assert_eq!(stored, "trigram/384/unit");
                assert_eq!(configured, "trigram/384/raw");
            }
            other => panic!("expected EmbedderMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_header_is_rejected_before_allocation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(MAGIC);
        header[4] = FORMAT_VERSION;
        header[5] = DistanceMetric::default().tag();
        header[6..10].copy_from_slice(&u32::MAX.to_le_bytes());
        header[10..18].copy_from_slice(&1u64.to_le_bytes());
        let checksum = crc32fast::hash(&header[0..18]);
        header[18..22].copy_from_slice(&checksum.to_le_bytes());
        fs::write(storage.vectors_path(), header).unwrap();

        assert!(matches!(
            storage.load_vectors(),
            Err(RetrievalError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_save_rejects_misaligned_pair() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        let (store, _) = sample();
        let index = VectorIndex::build(vec![vec![1.0, 2.0, 3.0]]).unwrap();

        assert!(matches!(
            storage.save(&store, &index),
            Err(RetrievalError::StoreIndexMismatch { store: 2, index: 1 })
        ));
        assert!(!storage.exists());
    }

    #[test]
    fn test_payload_corruption_detected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        let (store, index) = sample();
        storage.save(&store, &index).unwrap();

        let path = storage.vectors_path();
        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_SIZE + 2] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            storage.load_vectors(),
            Err(RetrievalError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_header_corruption_detected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        let (store, index) = sample();
        storage.save(&store, &index).unwrap();

        let path = storage.vectors_path();
        let mut bytes = fs::read(&path).unwrap();
        bytes[12] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            storage.load_vectors(),
            Err(RetrievalError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_truncated_and_trailing_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        let (store, index) = sample();
        storage.save(&store, &index).unwrap();

        let path = storage.vectors_path();
        let bytes = fs::read(&path).unwrap();

        fs::write(&path, &bytes[..bytes.len() - 6]).unwrap();
        assert!(matches!(
            storage.load_vectors(),
            Err(RetrievalError::CorruptArtifact(_))
        ));

        let mut longer = bytes.clone();
        longer.push(0);
        fs::write(&path, longer).unwrap();
        assert!(matches!(
            storage.load_vectors(),
            Err(RetrievalError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_garbage_documents_file_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        fs::write(storage.documents_path(), "not json").unwrap();

        assert!(matches!(
            storage.load_documents(),
            Err(RetrievalError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_failed_write_keeps_previous_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        let (store, index) = sample();
        storage.save(&store, &index).unwrap();

        let result = storage.write_atomically(&storage.documents_path(), |writer| {
            writer.write_all(b"{\"version\":1,")?;
            Err(RetrievalError::Config("simulated failure".to_string()))
        });
        assert!(result.is_err());

        assert_eq!(storage.load_documents().unwrap(), store.documents().to_vec());
        let leftovers = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 2);
    }

    #[test]
    fn test_missing_files_are_io_errors() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        assert!(!storage.exists());
        assert!(matches!(storage.load(), Err(RetrievalError::Io(_))));
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStore::new(temp_dir.path());
        let (store, index) = sample();
        storage.save(&store, &index).unwrap();

        storage.delete().unwrap();
        assert!(!storage.exists());
    }
}
