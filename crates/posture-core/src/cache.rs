//! Content-addressed artifact cache. Entries never expire implicitly;
//! operators prune by retiring a prompt version.

use crate::artifact::SectionArtifact;
use crate::storage::Store;

/// Identity of one cached analysis. Uniqueness is enforced by the store's
/// index over `(section_id, inputs_fingerprint, prompt_version, model)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub section_id: String,
    pub inputs_fingerprint: String,
    pub prompt_version: String,
    pub schema_version: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct CacheHit {
    pub artifact: SectionArtifact,
    pub hit_count: i64,
}

#[derive(Clone)]
pub struct ArtifactCache {
    store: Store,
}

impl ArtifactCache {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// On hit the artifact is re-validated before being returned; a stored
    /// entry that no longer parses is treated as a miss.
    pub fn lookup(&self, key: &CacheKey, signal_count: usize) -> Option<CacheHit> {
        let row = match self.store.lookup_cache(
            &key.section_id,
            &key.inputs_fingerprint,
            &key.prompt_version,
            &key.model,
        ) {
            Ok(row) => row?,
            Err(e) => {
                tracing::warn!(section_id = %key.section_id, error = %e, "cache lookup failed");
                return None;
            }
        };

        match SectionArtifact::parse_and_validate(&row.artifact_json, signal_count) {
            Ok(artifact) => {
                tracing::info!(section_id = %key.section_id, hits = row.hit_count, "cache hit");
                Some(CacheHit {
                    artifact,
                    hit_count: row.hit_count,
                })
            }
            Err(e) => {
                tracing::warn!(section_id = %key.section_id, error = %e,
                    "cached artifact failed validation, treating as miss");
                None
            }
        }
    }

    /// Store a validated artifact. Persistence failures (including losing
    /// an insert race to a concurrent writer) are swallowed: the call
    /// already succeeded, the entry is simply not written.
    pub fn store(
        &self,
        key: &CacheKey,
        artifact: &SectionArtifact,
        tokens_prompt: i64,
        tokens_completion: i64,
        cost_usd: f64,
    ) {
        let json = match serde_json::to_string(artifact) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(section_id = %key.section_id, error = %e, "cache serialize failed");
                return;
            }
        };
        if let Err(e) = self.store.insert_cache(
            &key.section_id,
            &key.inputs_fingerprint,
            &key.prompt_version,
            &key.schema_version,
            &key.model,
            &json,
            tokens_prompt,
            tokens_completion,
            cost_usd,
        ) {
            tracing::debug!(section_id = %key.section_id, error = %e,
                "cache store skipped (lost race or persistence error)");
        } else {
            tracing::info!(section_id = %key.section_id, "cached artifact");
        }
    }
}
