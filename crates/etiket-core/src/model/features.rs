//! Token feature extraction.
//!
//! The tagger scores tokens from hashed sparse features. Which feature
//! families are active depends on the configured embedding type: `char`
//! uses character n-grams, `flair` uses word identity plus shape features,
//! `bert` uses fixed-width subword chunks. Context features are drawn from
//! neighboring tokens within the configured window.

use crate::model::EmbeddingType;

/// Sparse feature indices for every token of a sentence.
pub type SentenceFeatures = Vec<Vec<usize>>;

/// Extracts hashed sparse features for tokens in context.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    embedding: EmbeddingType,
    buckets: usize,
    window: usize,
}

impl FeatureExtractor {
    /// `buckets` is the size of the hashed feature space (the tagger's
    /// hidden size); `window` is the context radius in tokens.
    pub fn new(embedding: EmbeddingType, buckets: usize, window: usize) -> Self {
        Self {
            embedding,
            buckets: buckets.max(1),
            window,
        }
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Extract features for every token of a sentence.
    pub fn extract(&self, tokens: &[String]) -> SentenceFeatures {
        (0..tokens.len())
            .map(|i| self.token_features(tokens, i))
            .collect()
    }

    /// Like [`extract`](Self::extract), but randomly drops each feature with
    /// probability `dropout`. Training only; prediction never drops.
    pub fn extract_with_dropout(
        &self,
        tokens: &[String],
        dropout: f64,
        rng: &mut oorandom::Rand64,
    ) -> SentenceFeatures {
        let mut features = self.extract(tokens);
        if dropout <= 0.0 {
            return features;
        }
        for token_feats in &mut features {
            token_feats.retain(|_| rng.rand_float() >= dropout);
        }
        features
    }

    fn token_features(&self, tokens: &[String], pos: usize) -> Vec<usize> {
        let token = &tokens[pos];
        let mut feats = Vec::with_capacity(16);

        self.push_surface_features(token, "", &mut feats);

        // Context tokens, tagged with their relative offset.
        for offset in 1..=self.window {
            if pos >= offset {
                self.push_identity(&tokens[pos - offset], &format!("l{}", offset), &mut feats);
            }
            if pos + offset < tokens.len() {
                self.push_identity(&tokens[pos + offset], &format!("r{}", offset), &mut feats);
            }
        }

        // Position hints.
        if pos == 0 {
            feats.push(self.bucket_of("@bos"));
        }
        if pos + 1 == tokens.len() {
            feats.push(self.bucket_of("@eos"));
        }

        feats
    }

    fn push_surface_features(&self, token: &str, prefix: &str, feats: &mut Vec<usize>) {
        let lower = token.to_lowercase();

        // Shape features, shared by every embedding type.
        if token.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()) {
            feats.push(self.bucket_of(&format!("{}shape=allcaps", prefix)));
        }
        if token.chars().next().is_some_and(char::is_uppercase) {
            feats.push(self.bucket_of(&format!("{}shape=init-cap", prefix)));
        }
        if token.chars().any(|c| c.is_ascii_digit()) {
            feats.push(self.bucket_of(&format!("{}shape=has-digit", prefix)));
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            feats.push(self.bucket_of(&format!("{}shape=all-digit", prefix)));
        }

        match self.embedding {
            EmbeddingType::Char => {
                // Character n-grams, n = 1..3.
                let chars: Vec<char> = lower.chars().collect();
                for n in 1..=3usize {
                    for gram in chars.windows(n) {
                        let gram: String = gram.iter().collect();
                        feats.push(self.bucket_of(&format!("{}c{}={}", prefix, n, gram)));
                    }
                }
            }
            EmbeddingType::Flair => {
                self.push_identity(token, prefix, feats);
                // Suffixes carry most of the morphology in agglutinative text.
                for n in 1..=3usize {
                    if lower.chars().count() > n {
                        let suffix: String = lower
                            .chars()
                            .rev()
                            .take(n)
                            .collect::<Vec<_>>()
                            .into_iter()
                            .rev()
                            .collect();
                        feats.push(self.bucket_of(&format!("{}suf{}={}", prefix, n, suffix)));
                    }
                }
            }
            EmbeddingType::Bert => {
                // Fixed-width subword chunks of the lowercased token.
                let chars: Vec<char> = lower.chars().collect();
                for (i, chunk) in chars.chunks(4).enumerate() {
                    let piece: String = chunk.iter().collect();
                    let marker = if i == 0 { "" } else { "##" };
                    feats.push(self.bucket_of(&format!("{}wp={}{}", prefix, marker, piece)));
                }
            }
        }
    }

    fn push_identity(&self, token: &str, prefix: &str, feats: &mut Vec<usize>) {
        feats.push(self.bucket_of(&format!("{}w={}", prefix, token.to_lowercase())));
    }

    fn bucket_of(&self, feature: &str) -> usize {
        (fnv1a(feature.as_bytes()) as usize) % self.buckets
    }
}

/// FNV-1a, stable across runs so persisted weights keep their meaning.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn features_are_within_buckets() {
        let extractor = FeatureExtractor::new(EmbeddingType::Char, 64, 2);
        let feats = extractor.extract(&tokens(&["Ankara", "'da", "kaldı"]));
        assert_eq!(feats.len(), 3);
        for token_feats in &feats {
            assert!(!token_feats.is_empty());
            assert!(token_feats.iter().all(|&f| f < 64));
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = FeatureExtractor::new(EmbeddingType::Flair, 128, 1);
        let sentence = tokens(&["Ali", "geldi"]);
        assert_eq!(extractor.extract(&sentence), extractor.extract(&sentence));
    }

    #[test]
    fn embedding_types_produce_different_features() {
        let sentence = tokens(&["istanbul"]);
        let char_feats = FeatureExtractor::new(EmbeddingType::Char, 1024, 0).extract(&sentence);
        let bert_feats = FeatureExtractor::new(EmbeddingType::Bert, 1024, 0).extract(&sentence);
        assert_ne!(char_feats, bert_feats);
    }

    #[test]
    fn full_dropout_removes_all_features() {
        let extractor = FeatureExtractor::new(EmbeddingType::Char, 64, 1);
        let mut rng = oorandom::Rand64::new(9);
        let feats = extractor.extract_with_dropout(&tokens(&["bir", "iki"]), 1.0, &mut rng);
        assert!(feats.iter().all(|f| f.is_empty()));
    }

    #[test]
    fn zero_dropout_is_identity() {
        let extractor = FeatureExtractor::new(EmbeddingType::Bert, 64, 1);
        let sentence = tokens(&["bir", "iki"]);
        let mut rng = oorandom::Rand64::new(9);
        assert_eq!(
            extractor.extract_with_dropout(&sentence, 0.0, &mut rng),
            extractor.extract(&sentence)
        );
    }
}
