//! Cache rows for section artifacts, keyed by
//! `(section_id, answers_hash, prompt_version, model)`.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::rows::CacheRow;
use super::{now_ts, Store};

impl Store {
    /// Fetch a cache entry and, on hit, bump `hit_count` / `last_used_at`.
    pub fn lookup_cache(
        &self,
        section_id: &str,
        answers_hash: &str,
        prompt_version: &str,
        model: &str,
    ) -> anyhow::Result<Option<CacheRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, section_id, answers_hash, prompt_version, schema_version, model, \
                        artifact_json, tokens_prompt, tokens_completion, total_cost_usd, hit_count \
                 FROM ai_section_cache \
                 WHERE section_id = ?1 AND answers_hash = ?2 AND prompt_version = ?3 AND model = ?4",
                params![section_id, answers_hash, prompt_version, model],
                |r| {
                    Ok(CacheRow {
                        id: r.get(0)?,
                        section_id: r.get(1)?,
                        answers_hash: r.get(2)?,
                        prompt_version: r.get(3)?,
                        schema_version: r.get(4)?,
                        model: r.get(5)?,
                        artifact_json: r.get(6)?,
                        tokens_prompt: r.get(7)?,
                        tokens_completion: r.get(8)?,
                        total_cost_usd: r.get(9)?,
                        hit_count: r.get(10)?,
                    })
                },
            )
            .optional()?;

        let Some(mut row) = row else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE ai_section_cache SET last_used_at = ?1, hit_count = hit_count + 1 \
             WHERE id = ?2",
            params![now_ts(), row.id],
        )?;
        row.hit_count += 1;
        Ok(Some(row))
    }

    /// Insert a cache entry. The unique index forces one winner under
    /// concurrent writers; the constraint violation is surfaced so the
    /// caller can re-read the winning entry.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_cache(
        &self,
        section_id: &str,
        answers_hash: &str,
        prompt_version: &str,
        schema_version: &str,
        model: &str,
        artifact_json: &str,
        tokens_prompt: i64,
        tokens_completion: i64,
        total_cost_usd: f64,
    ) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO ai_section_cache(id, section_id, answers_hash, prompt_version, \
                 schema_version, model, artifact_json, tokens_prompt, tokens_completion, \
                 total_cost_usd, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                Uuid::new_v4().to_string(),
                section_id,
                answers_hash,
                prompt_version,
                schema_version,
                model,
                artifact_json,
                tokens_prompt,
                tokens_completion,
                total_cost_usd,
                now_ts(),
            ],
        )?;
        Ok(())
    }

    /// Administrative pruning when a prompt version is retired. Entries
    /// never expire implicitly.
    pub fn prune_cache_by_prompt_version(&self, prompt_version: &str) -> anyhow::Result<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM ai_section_cache WHERE prompt_version = ?1",
            params![prompt_version],
        )?;
        Ok(n)
    }
}
