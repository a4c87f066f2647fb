use async_trait::async_trait;

use crate::{EmbeddingError, EmbeddingProvider};

/// Deterministic embedding provider for tests and offline runs.
///
/// Hashes the query text and uses the hash to seed a sinusoid over the
/// vector indices, then normalizes to unit length. Equal inputs always
/// produce equal vectors; distinct inputs almost always diverge.
pub struct StubEmbedder {
    dim: usize,
}

impl StubEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let seed = fnv1a(text);
        let phase = (seed % 10_000) as f32 / 10_000.0;
        let freq = 1.0 + (seed >> 32 & 0xff) as f32 / 64.0;

        let mut vector: Vec<f32> = (0..self.dim)
            .map(|i| ((i as f32 * freq) + phase * std::f32::consts::TAU).sin())
            .collect();
        crate::l2_normalize_in_place(&mut vector);
        Ok(vector)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_is_deterministic() {
        let stub = StubEmbedder::new(32);
        let a = stub.embed("grab the red cube").await.unwrap();
        let b = stub.embed("grab the red cube").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_inputs_diverge() {
        let stub = StubEmbedder::new(32);
        let a = stub.embed("grab").await.unwrap();
        let b = stub.embed("navigate").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn output_is_unit_length() {
        let stub = StubEmbedder::new(768);
        let v = stub.embed("general scene context").await.unwrap();
        assert_eq!(v.len(), 768);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
