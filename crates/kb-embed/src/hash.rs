use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use kb_core::language::is_cjk;
use kb_core::traits::Embedder;

/// Deterministic bag-of-features embedder for tests and offline runs.
///
/// Latin words and CJK character bigrams are hashed into `dim` buckets and
/// the result is L2-normalised, so texts sharing terms have positive cosine
/// similarity. It carries no semantics beyond term overlap.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for feature in features(text) {
            let mut hasher = XxHash64::with_seed(0);
            feature.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign * (0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-6 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn features(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    let mut prev_cjk: Option<char> = None;
    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                out.push(std::mem::take(&mut word));
            }
            match prev_cjk {
                Some(p) => out.push(format!("{p}{c}")),
                None => out.push(c.to_string()),
            }
            prev_cjk = Some(c);
        } else {
            prev_cjk = None;
            if c.is_alphanumeric() {
                word.extend(c.to_lowercase());
            } else if !word.is_empty() {
                out.push(std::mem::take(&mut word));
            }
        }
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn shared_terms_are_closer() {
        let e = HashEmbedder::new(256);
        let a = e.embed("annual leave policy").unwrap();
        let b = e.embed("leave policy for staff").unwrap();
        let c = e.embed("network badge reader").unwrap();
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[test]
    fn cjk_features_are_bigrams() {
        assert_eq!(features("年假abc"), vec!["年", "年假", "abc"]);
    }

    #[test]
    fn blank_text_is_zero_vector() {
        let v = HashEmbedder::new(8).embed("   ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
