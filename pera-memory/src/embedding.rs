use sha2::{Digest, Sha256};

/// Produces a fixed-dimension, cosine-comparable embedding from text.
///
/// `spec.md`'s Open Question on embedding model choice resolves to: any
/// provider satisfying this contract is acceptable (see `SPEC_FULL.md` §9).
/// This trait lets `pera-memory` depend on the contract rather than a
/// concrete model.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimensions(&self) -> usize;
}

/// Deterministic local provider: hashes overlapping trigrams of the
/// normalized input into a fixed-width bucket vector, then L2-normalizes it.
/// No network calls, no model weights — every call with the same text
/// always produces the same vector, which is all the cosine-similarity
/// search in [`crate::knowledge::InMemoryKnowledgeStore`] requires.
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(8) }
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn embed(&self, text: &str) -> Vec<f32> {
        let normalized = text.to_lowercase();
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let mut buckets = vec![0f32; self.dimensions];

        let mut feed = |gram: &str| {
            let mut hasher = Sha256::new();
            hasher.update(gram.as_bytes());
            let digest = hasher.finalize();
            let idx = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimensions;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            buckets[idx] += sign;
        };

        for token in &tokens {
            feed(token);
        }
        for window in tokens.windows(2) {
            feed(&format!("{}_{}", window[0], window[1]));
        }

        let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut buckets {
                *v /= norm;
            }
        }
        buckets
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cosine similarity between two equal-length vectors, clamped to `[0, 1]`
/// per the data model's similarity-score contract (embeddings here are
/// already unit-normalized, so raw cosine in `[-1, 1]` is rescaled).
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    ((dot / (norm_a * norm_b)) + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_embeds_identically() {
        let provider = HashingEmbeddingProvider::default();
        assert_eq!(provider.embed("search the web"), provider.embed("search the web"));
    }

    #[test]
    fn similar_text_scores_higher_than_unrelated() {
        let provider = HashingEmbeddingProvider::default();
        let a = provider.embed("search the web for articles");
        let b = provider.embed("search the web for news");
        let c = provider.embed("bake a loaf of sourdough bread");
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn similarity_is_bounded() {
        let provider = HashingEmbeddingProvider::default();
        let a = provider.embed("x");
        let b = provider.embed("y");
        let sim = cosine_similarity(&a, &b);
        assert!((0.0..=1.0).contains(&sim));
    }
}
