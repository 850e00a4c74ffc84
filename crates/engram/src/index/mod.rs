//! Flat in-memory similarity index
//!
//! Vectors are L2-normalized on the way in (and queries before scoring), so
//! the inner product of two stored rows is their cosine similarity. The index
//! owns its own vector arena, separate from the entry cache; there is no
//! per-row delete, callers replace the whole arena with [`SimilarityIndex::rebuild`].

use uuid::Uuid;

use crate::error::{MemoryError, Result};

/// Exhaustive inner-product index over normalized vectors.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    dimension: usize,
    ids: Vec<Uuid>,
    /// Row-major `ids.len() x dimension` matrix
    vectors: Vec<f32>,
}

impl SimilarityIndex {
    /// Create an empty index accepting vectors of exactly `dimension` floats
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append a vector under `id`.
    pub fn insert(&mut self, id: Uuid, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        self.ids.push(id);
        self.vectors.extend(normalized(vector));
        Ok(())
    }

    /// Return up to `k` `(id, cosine)` pairs, best first.
    ///
    /// Equal scores keep insertion order. An empty index yields an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Uuid, f32)>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query)?;

        let query = normalized(query);
        let mut scored: Vec<(Uuid, f32)> = self
            .ids
            .iter()
            .zip(self.vectors.chunks_exact(self.dimension))
            .map(|(id, row)| (*id, dot(&query, row)))
            .collect();

        // sort_by is stable, so ties stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    /// Discard every row and load `entries` in order.
    ///
    /// All vectors are validated before anything is replaced, so a failed
    /// rebuild leaves the previous contents intact.
    pub fn rebuild<'a, I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (Uuid, &'a [f32])>,
    {
        let entries = entries.into_iter();
        let (lower, _) = entries.size_hint();
        let mut ids = Vec::with_capacity(lower);
        let mut vectors = Vec::with_capacity(lower * self.dimension);

        for (id, vector) in entries {
            self.check_dimension(vector)?;
            ids.push(id);
            vectors.extend(normalized(vector));
        }

        self.ids = ids;
        self.vectors = vectors;
        Ok(())
    }

    /// Whether `id` has a row in the index
    pub fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(MemoryError::Embedding(format!(
                "expected a {}-dimensional vector, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }
}

/// Scale `vector` to unit length. The zero vector is returned unchanged.
pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
