use async_trait::async_trait;
use routecore::GatewayError;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Converts text into a fixed-length vector
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError>;

    /// Length of every vector this gateway returns
    fn dimension(&self) -> usize;

    fn name(&self) -> &str {
        "unknown"
    }
}

/// Local feature-hashing embedder
///
/// Each lowercased word is hashed to one bucket with a hash-derived sign and
/// the result is L2-normalized. Deterministic, no network access, so the
/// semantic router works offline with word-overlap similarity.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn compute(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase);

        for word in words {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut vector {
                *val /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingGateway for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(self.compute(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}
