//! Flat dense inner-product vector index with a JSON-lines sidecar.
//!
//! Rows are L2-normalised at build time, so inner product over stored
//! rows is cosine similarity. The binary layout is
//! `magic "OGVI" | version u32 | dimension u32 | rows u64 | f32 data`,
//! little-endian, row-major; the sidecar holds one [`ChunkRecord`] per
//! row in embedding order.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use onegraph_domain::CollectionId;
use onegraph_domain::entities::ChunkRecord;
use onegraph_domain::error::{Error, Result};
use onegraph_domain::ports::VectorIndexProvider;

const MAGIC: &[u8; 4] = b"OGVI";
const VERSION: u32 = 1;

/// One query hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Chunk the row belongs to.
    pub chunk_id: String,
    /// Inner product of unit vectors; cosine similarity.
    pub score: f32,
    /// Sidecar row, when present.
    pub metadata: Option<ChunkRecord>,
}

/// Dense exact-search index for one collection.
pub struct FlatVectorIndex {
    index_path: PathBuf,
    metadata_path: PathBuf,
    dimension: usize,
    vectors: Vec<f32>,
    ids: Vec<String>,
    metadata: HashMap<String, ChunkRecord>,
}

impl FlatVectorIndex {
    /// Open (and create) the per-collection index directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the directory cannot be created.
    pub fn open(
        indexes_dir: &Path,
        collection: &CollectionId,
        index_filename: &str,
        metadata_filename: &str,
    ) -> Result<Self> {
        let base_dir = indexes_dir.join(collection.as_str()).join("faiss");
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            index_path: base_dir.join(index_filename),
            metadata_path: base_dir.join(metadata_filename),
            dimension: 0,
            vectors: Vec::new(),
            ids: Vec::new(),
            metadata: HashMap::new(),
        })
    }

    /// Number of indexed rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the index holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Normalise and store the embedding matrix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VectorIndex`] for an empty or ragged matrix or
    /// when ids and rows disagree in count.
    pub fn build(&mut self, embeddings: &[Vec<f32>], ids: Vec<String>) -> Result<()> {
        if embeddings.is_empty() {
            return Err(Error::vector_index("no embeddings provided"));
        }
        if embeddings.len() != ids.len() {
            return Err(Error::vector_index(format!(
                "{} embeddings for {} ids",
                embeddings.len(),
                ids.len()
            )));
        }
        let dimension = embeddings[0].len();
        if dimension == 0 {
            return Err(Error::vector_index("zero-dimensional embeddings"));
        }

        let mut vectors = Vec::with_capacity(embeddings.len() * dimension);
        for row in embeddings {
            if row.len() != dimension {
                return Err(Error::vector_index(format!(
                    "ragged embedding matrix: expected {dimension} dims, found {}",
                    row.len()
                )));
            }
            vectors.extend(normalized(row));
        }

        self.dimension = dimension;
        self.vectors = vectors;
        self.ids = ids;
        Ok(())
    }

    /// Attach sidecar rows, keyed by chunk id.
    pub fn set_metadata(&mut self, rows: Vec<ChunkRecord>) {
        self.metadata = rows
            .into_iter()
            .map(|row| (row.chunk_id.clone(), row))
            .collect();
    }

    /// Persist the index binary and the sidecar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VectorIndex`] when nothing was built yet, and
    /// [`Error::Io`] on write failure.
    pub fn save(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::vector_index("index has not been built yet"));
        }

        let mut writer = BufWriter::new(std::fs::File::create(&self.index_path)?);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&u32::try_from(self.dimension).unwrap_or(u32::MAX).to_le_bytes())?;
        writer.write_all(&(self.ids.len() as u64).to_le_bytes())?;
        for value in &self.vectors {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()?;

        let mut sidecar = BufWriter::new(std::fs::File::create(&self.metadata_path)?);
        for chunk_id in &self.ids {
            let row = self.metadata.get(chunk_id).cloned().unwrap_or(ChunkRecord {
                chunk_id: chunk_id.clone(),
                node_id: None,
                path: String::new(),
                locator: None,
                text: String::new(),
                text_snippet: String::new(),
            });
            serde_json::to_writer(&mut sidecar, &row)?;
            sidecar.write_all(b"\n")?;
        }
        sidecar.flush()?;
        Ok(())
    }

    /// Load the index binary and sidecar from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the index file is missing and
    /// [`Error::VectorIndex`] for a corrupt file.
    pub fn load(&mut self) -> Result<()> {
        if !self.index_path.exists() {
            return Err(Error::NotFound {
                resource: format!("vector index at {}", self.index_path.display()),
            });
        }

        let mut reader = BufReader::new(std::fs::File::open(&self.index_path)?);
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::vector_index("bad index magic"));
        }
        let version = read_u32(&mut reader)?;
        if version != VERSION {
            return Err(Error::vector_index(format!(
                "unsupported index version {version}"
            )));
        }
        let dimension = read_u32(&mut reader)? as usize;
        let rows = usize::try_from(read_u64(&mut reader)?)
            .map_err(|_| Error::vector_index("row count overflow"))?;

        let mut vectors = vec![0f32; rows * dimension];
        let mut buffer = [0u8; 4];
        for value in &mut vectors {
            reader.read_exact(&mut buffer)?;
            *value = f32::from_le_bytes(buffer);
        }

        let mut ids = Vec::with_capacity(rows);
        let mut metadata = HashMap::with_capacity(rows);
        let sidecar = BufReader::new(std::fs::File::open(&self.metadata_path)?);
        for line in sidecar.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row: ChunkRecord = serde_json::from_str(&line)
                .map_err(|err| Error::vector_index(format!("corrupt sidecar row: {err}")))?;
            ids.push(row.chunk_id.clone());
            metadata.insert(row.chunk_id.clone(), row);
        }
        if ids.len() != rows {
            return Err(Error::vector_index(format!(
                "sidecar holds {} rows, index holds {rows}",
                ids.len()
            )));
        }

        self.dimension = dimension;
        self.vectors = vectors;
        self.ids = ids;
        self.metadata = metadata;
        Ok(())
    }

    /// Top-k rows by inner product against a normalised query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VectorIndex`] when the index is not loaded or
    /// the query dimension disagrees.
    pub fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        if self.dimension == 0 {
            return Err(Error::vector_index("index is not loaded"));
        }
        if vector.len() != self.dimension {
            return Err(Error::vector_index(format!(
                "query has {} dims, index has {}",
                vector.len(),
                self.dimension
            )));
        }

        let query = normalized(vector);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks(self.dimension)
            .enumerate()
            .map(|(idx, row)| {
                let score = row.iter().zip(&query).map(|(a, b)| a * b).sum();
                (idx, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(idx, score)| {
                let chunk_id = self.ids[idx].clone();
                let metadata = self.metadata.get(&chunk_id).cloned();
                VectorHit {
                    chunk_id,
                    score,
                    metadata,
                }
            })
            .collect())
    }
}

/// L2-normalise a row; zero-norm rows become the zero vector.
fn normalized(row: &[f32]) -> Vec<f32> {
    let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return row.to_vec();
    }
    row.iter().map(|v| v / norm).collect()
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_le_bytes(buffer))
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

/// [`VectorIndexProvider`] over per-collection flat indexes.
pub struct FlatIndexProvider {
    indexes_dir: PathBuf,
    index_filename: String,
    metadata_filename: String,
}

impl FlatIndexProvider {
    /// Create a provider rooted at the indexes directory.
    #[must_use]
    pub fn new(indexes_dir: PathBuf, index_filename: &str, metadata_filename: &str) -> Self {
        Self {
            indexes_dir,
            index_filename: index_filename.to_owned(),
            metadata_filename: metadata_filename.to_owned(),
        }
    }

    /// Open the index of a collection for loading and querying.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the directory cannot be created.
    pub fn open(&self, collection: &CollectionId) -> Result<FlatVectorIndex> {
        FlatVectorIndex::open(
            &self.indexes_dir,
            collection,
            &self.index_filename,
            &self.metadata_filename,
        )
    }
}

#[async_trait]
impl VectorIndexProvider for FlatIndexProvider {
    async fn build_index(
        &self,
        collection: &CollectionId,
        embeddings: Vec<Vec<f32>>,
        records: Vec<ChunkRecord>,
    ) -> Result<()> {
        let mut index = self.open(collection)?;
        let ids = records.iter().map(|record| record.chunk_id.clone()).collect();
        index.build(&embeddings, ids)?;
        index.set_metadata(records);
        index.save()
    }
}
