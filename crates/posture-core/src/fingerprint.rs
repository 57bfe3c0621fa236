//! Content-addressed fingerprint over a section's normalized inputs.
//!
//! Permutations of the input list and whitespace/case variants of answers,
//! comments and context all hash identically; any semantic change to an
//! answer, weight, comment or context flips the digest.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::model::SectionResponse;

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Compute the inputs fingerprint: project each input to `{q,a,w,c,ctx}`
/// (question text truncated to 100 chars, answer/comment/context trimmed
/// and lowercased), sort by `q`, serialize with sorted keys and no
/// whitespace, SHA-256 the result.
pub fn compute(inputs: &[SectionResponse]) -> String {
    let mut projected: Vec<(String, Value)> = inputs
        .iter()
        .map(|resp| {
            let q: String = resp.question.chars().take(100).collect();
            // Keys inserted in sorted order so serialization is canonical.
            let mut obj = Map::new();
            obj.insert("a".into(), Value::String(normalize(&resp.answer)));
            obj.insert(
                "c".into(),
                Value::String(resp.comment.as_deref().map(normalize).unwrap_or_default()),
            );
            obj.insert(
                "ctx".into(),
                Value::String(resp.context.as_deref().map(normalize).unwrap_or_default()),
            );
            obj.insert("q".into(), Value::String(q.clone()));
            obj.insert("w".into(), Value::Number(resp.weight.into()));
            (q, Value::Object(obj))
        })
        .collect();

    projected.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical = Value::Array(projected.into_iter().map(|(_, v)| v).collect());
    sha256_hex(&canonical.to_string())
}
