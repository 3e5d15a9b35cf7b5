use super::Embeddings;
use crate::error::Result;
use async_trait::async_trait;

pub const DEFAULT_DIMENSIONS: usize = 128;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Output must not change between builds, saved vectors depend on it.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}

/// Bag-of-words hashing into a fixed-size, L2-normalized vector.
///
/// Texts sharing words score close together; synonyms do not.
#[derive(Debug, Clone)]
pub struct HashEmbeddings {
    dimensions: usize,
    label: String,
}

impl HashEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            label: format!("hash({})", dimensions),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let idx = (fnv1a(word.as_bytes()) % self.dimensions as u64) as usize;
            embedding[idx] += 1.0;
        }

        let magnitude = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in embedding.iter_mut() {
                *val /= magnitude;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embeddings for HashEmbeddings {
    fn name(&self) -> &str {
        &self.label
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}
