//! Deterministic hashing bag-of-words embeddings.
//!
//! Each token of length ≥ `min_token_len` is hashed with FNV-1a and spread
//! over `hashes_per_token` distinct buckets; the resulting count vector is
//! L2-normalized. The function is pure: the same text always yields a
//! bit-identical vector, across calls and across process restarts.

use phylactery_types::config::EmbeddingConfig;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Rotation and seed pairs used to derive the per-token buckets.
const ROTATIONS: [u32; 4] = [0, 7, 13, 19];
const SEEDS: [u32; 4] = [0x9e37_79b9, 0x85eb_ca6b, 0xc2b2_ae35, 0x27d4_eb2f];

/// Text to fixed-length feature vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    config: EmbeddingConfig,
}

impl HashingEmbedder {
    /// Create an embedder with the given parameters.
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    /// Length of the vectors produced by [`embed`](Self::embed).
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Lowercase, split on runs of non-word characters, drop short tokens.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| t.chars().count() >= self.config.min_token_len)
            .map(str::to_string)
            .collect()
    }

    /// Embed `text`. Text without qualifying tokens yields the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let dims = self.config.dimensions;
        let mut vector = vec![0.0f32; dims];
        if dims == 0 {
            return vector;
        }
        let per_token = self.config.hashes_per_token.min(dims);

        let mut chosen = Vec::with_capacity(per_token);
        for token in self.tokenize(text) {
            let hash = token_hash(&token);
            chosen.clear();
            for k in 0..per_token {
                let mut idx = bucket(hash, k, dims);
                // Linear probe keeps the buckets of one token distinct.
                while chosen.contains(&idx) {
                    idx = (idx + 1) % dims;
                }
                chosen.push(idx);
                vector[idx] += 1.0;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }

    /// Cosine similarity of the embeddings of two texts.
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        cosine_similarity(&self.embed(a), &self.embed(b))
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(EmbeddingConfig::default())
    }
}

/// 32-bit FNV-1a over the token's UTF-8 bytes.
fn token_hash(token: &str) -> u32 {
    token.bytes().fold(FNV_OFFSET, |h, b| {
        (h ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// The `k`-th bucket of a token hash.
fn bucket(hash: u32, k: usize, dims: usize) -> usize {
    let round = (k / SEEDS.len()) as u32 + 1;
    let seed = SEEDS[k % SEEDS.len()].wrapping_mul(round);
    let mut x = hash.rotate_left(ROTATIONS[k % ROTATIONS.len()]) ^ seed;
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    (x as usize) % dims
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0 when the dimensions differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_embed_is_deterministic() {
        let e = HashingEmbedder::default();
        let text = "The quick brown fox jumps over the lazy dog";
        let a = e.embed(text);
        let b = e.embed(text);
        let c = HashingEmbedder::default().embed(text);
        assert_eq!(a.len(), 128);
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
        assert!(a.iter().zip(&c).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_embed_unit_norm() {
        let e = HashingEmbedder::default();
        for text in ["hello world", "Memory consolidation runs nightly!", "abc"] {
            assert!((norm(&e.embed(text)) - 1.0).abs() < 1e-5, "{text}");
        }
    }

    #[test]
    fn test_embed_zero_vector_without_tokens() {
        let e = HashingEmbedder::default();
        for text in ["", "a b", "   ...  !!", "to be or"] {
            let v = e.embed(text);
            assert_eq!(v.len(), 128);
            assert!(v.iter().all(|x| *x == 0.0), "{text:?}");
        }
    }

    #[test]
    fn test_single_token_fills_distinct_buckets() {
        let e = HashingEmbedder::default();
        let v = e.embed("phylactery");
        let nonzero: Vec<f32> = v.iter().copied().filter(|x| *x != 0.0).collect();
        assert_eq!(nonzero.len(), 4);
        assert!(nonzero.iter().all(|x| (x - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_tokenize_splits_on_non_word() {
        let e = HashingEmbedder::default();
        assert_eq!(
            e.tokenize("Hello, WORLD -- it's a snake_case test!"),
            vec!["hello", "world", "snake_case", "test"]
        );
    }

    #[test]
    fn test_case_insensitive() {
        let e = HashingEmbedder::default();
        assert_eq!(e.embed("Rust Memory"), e.embed("rust memory"));
    }

    #[test]
    fn test_self_similarity() {
        let e = HashingEmbedder::default();
        let v = e.embed("the user prefers tea in the morning");
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_disjoint_vocabulary_is_dissimilar() {
        let e = HashingEmbedder::default();
        let sim = e.similarity(
            "quantum physics describes subatomic particles",
            "banana bread recipe needs flour sugar",
        );
        assert!(sim < 0.7, "similarity was {sim}");
        assert!(sim >= 0.0);
    }

    #[test]
    fn test_shared_vocabulary_is_similar() {
        let e = HashingEmbedder::default();
        let sim = e.similarity(
            "user enjoys hiking mountains during summer",
            "user enjoys hiking mountains during winter",
        );
        assert!(sim > 0.7, "similarity was {sim}");
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_zero_norm() {
        let zero = vec![0.0; 4];
        let v = vec![0.5, 0.5, 0.5, 0.5];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_token_hash_stable() {
        // FNV-1a reference values.
        assert_eq!(token_hash(""), 0x811c_9dc5);
        assert_eq!(token_hash("a"), 0xe40c_292c);
    }
}
