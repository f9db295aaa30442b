//! Embedder collaborator for the semantic tier. Spec-exempt from network
//! access by default: a lexical hashing embedder gives a deterministic,
//! dependency-free similarity signal, while `Embedder` lets a deployment
//! plug in a real model-backed embedder (e.g. an `OpenAiCompatAdapter`
//! embeddings call) without the router caring which one is wired up.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Produces a fixed-length embedding vector for a piece of text.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

const DIMENSIONS: usize = 256;

/// A bag-of-words hashing embedder: every lowercased token is hashed into
/// one of `DIMENSIONS` buckets and accumulated, giving text that shares
/// vocabulary a nonzero cosine similarity without calling out to a model.
pub struct LexicalEmbedder;

impl Embedder for LexicalEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; DIMENSIONS];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % DIMENSIONS;
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_embeds_identically() {
        let embedder = LexicalEmbedder;
        assert_eq!(embedder.embed("hello world"), embedder.embed("hello world"));
    }

    #[test]
    fn disjoint_vocabulary_rarely_collides() {
        let embedder = LexicalEmbedder;
        let a = embedder.embed("repeat the given text back");
        let b = embedder.embed("run arbitrary python code");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = LexicalEmbedder;
        let v = embedder.embed("");
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
