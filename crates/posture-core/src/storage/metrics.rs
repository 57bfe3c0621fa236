//! Per-call generation metadata and the daily rollup.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::rows::{DailyMetricsRow, GenerationMetadataRow};
use super::{now_ts, Store};

/// Sentinel `finish_reason` recorded for cache hits, which consume zero
/// tokens but still count toward the hit-rate denominator.
pub const FINISH_REASON_CACHE_HIT: &str = "cache_hit";

impl Store {
    pub fn insert_generation_metadata(&self, row: &GenerationMetadataRow) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO ai_generation_metadata(id, report_id, section_id, prompt_version, \
                 schema_version, model, temperature, max_tokens, tokens_prompt, tokens_completion, \
                 total_cost_usd, latency_ms, finish_reason, attempt_count, is_degraded, \
                 error_code, error_message, fallback_model, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                if row.id.is_empty() {
                    Uuid::new_v4().to_string()
                } else {
                    row.id.clone()
                },
                row.report_id,
                row.section_id,
                row.prompt_version,
                row.schema_version,
                row.model,
                row.temperature,
                row.max_tokens,
                row.tokens_prompt,
                row.tokens_completion,
                row.total_cost_usd,
                row.latency_ms,
                row.finish_reason,
                row.attempt_count,
                row.is_degraded as i64,
                row.error_code,
                row.error_message,
                row.fallback_model,
                now_ts(),
            ],
        )?;
        Ok(())
    }

    /// Roll up one day (`YYYY-MM-DD`) of generation metadata into
    /// `ai_daily_metrics`, upserting by date.
    ///
    /// `cache_hit_rate = hits / (hits + generated)`,
    /// `degraded_rate = degraded / generated`, `success = 1 - degraded`.
    pub fn rollup_daily_metrics(&self, date: &str) -> anyhow::Result<DailyMetricsRow> {
        let conn = self.lock();

        let (
            total_reports,
            total_rows,
            cache_hits,
            degraded,
            tokens_prompt,
            tokens_completion,
            cost,
            avg_latency,
        ): (i64, i64, i64, i64, i64, i64, f64, f64) = conn.query_row(
            "SELECT COUNT(DISTINCT report_id), \
                    COUNT(*), \
                    COALESCE(SUM(finish_reason = ?2), 0), \
                    COALESCE(SUM(is_degraded), 0), \
                    COALESCE(SUM(tokens_prompt), 0), \
                    COALESCE(SUM(tokens_completion), 0), \
                    COALESCE(SUM(total_cost_usd), 0), \
                    COALESCE(AVG(latency_ms), 0) \
             FROM ai_generation_metadata WHERE substr(created_at, 1, 10) = ?1",
            params![date, FINISH_REASON_CACHE_HIT],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                    r.get(7)?,
                ))
            },
        )?;

        let generated = total_rows - cache_hits;
        let cache_hit_rate = if cache_hits + generated > 0 {
            cache_hits as f64 / (cache_hits + generated) as f64
        } else {
            0.0
        };
        let degraded_rate = if generated > 0 {
            degraded as f64 / generated as f64
        } else {
            0.0
        };

        let row = DailyMetricsRow {
            date: date.to_string(),
            total_reports,
            total_sections: total_rows,
            total_tokens_prompt: tokens_prompt,
            total_tokens_completion: tokens_completion,
            total_cost_usd: cost,
            avg_latency_ms: avg_latency.round() as i64,
            cache_hit_rate,
            success_rate: 1.0 - degraded_rate,
            degraded_rate,
        };

        conn.execute(
            "INSERT INTO ai_daily_metrics(date, total_reports, total_sections, \
                 total_tokens_prompt, total_tokens_completion, total_cost_usd, avg_latency_ms, \
                 cache_hit_rate, success_rate, degraded_rate) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(date) DO UPDATE SET \
                 total_reports = excluded.total_reports, \
                 total_sections = excluded.total_sections, \
                 total_tokens_prompt = excluded.total_tokens_prompt, \
                 total_tokens_completion = excluded.total_tokens_completion, \
                 total_cost_usd = excluded.total_cost_usd, \
                 avg_latency_ms = excluded.avg_latency_ms, \
                 cache_hit_rate = excluded.cache_hit_rate, \
                 success_rate = excluded.success_rate, \
                 degraded_rate = excluded.degraded_rate",
            params![
                row.date,
                row.total_reports,
                row.total_sections,
                row.total_tokens_prompt,
                row.total_tokens_completion,
                row.total_cost_usd,
                row.avg_latency_ms,
                row.cache_hit_rate,
                row.success_rate,
                row.degraded_rate,
            ],
        )?;

        Ok(row)
    }

    pub fn get_daily_metrics(&self, date: &str) -> anyhow::Result<Option<DailyMetricsRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT date, total_reports, total_sections, total_tokens_prompt, \
                        total_tokens_completion, total_cost_usd, avg_latency_ms, cache_hit_rate, \
                        success_rate, degraded_rate \
                 FROM ai_daily_metrics WHERE date = ?1",
                params![date],
                |r| {
                    Ok(DailyMetricsRow {
                        date: r.get(0)?,
                        total_reports: r.get(1)?,
                        total_sections: r.get(2)?,
                        total_tokens_prompt: r.get(3)?,
                        total_tokens_completion: r.get(4)?,
                        total_cost_usd: r.get(5)?,
                        avg_latency_ms: r.get(6)?,
                        cache_hit_rate: r.get(7)?,
                        success_rate: r.get(8)?,
                        degraded_rate: r.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Cost breakdown for a single report: totals plus per-row detail.
    pub fn report_generation_rows(
        &self,
        report_id: &str,
    ) -> anyhow::Result<Vec<GenerationMetadataRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, report_id, section_id, prompt_version, schema_version, model, \
                    temperature, max_tokens, tokens_prompt, tokens_completion, total_cost_usd, \
                    latency_ms, finish_reason, attempt_count, is_degraded, error_code, \
                    error_message, fallback_model \
             FROM ai_generation_metadata WHERE report_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![report_id], |r| {
            Ok(GenerationMetadataRow {
                id: r.get(0)?,
                report_id: r.get(1)?,
                section_id: r.get(2)?,
                prompt_version: r.get(3)?,
                schema_version: r.get(4)?,
                model: r.get(5)?,
                temperature: r.get(6)?,
                max_tokens: r.get(7)?,
                tokens_prompt: r.get(8)?,
                tokens_completion: r.get(9)?,
                total_cost_usd: r.get(10)?,
                latency_ms: r.get(11)?,
                finish_reason: r.get(12)?,
                attempt_count: r.get(13)?,
                is_degraded: r.get::<_, i64>(14)? != 0,
                error_code: r.get(15)?,
                error_message: r.get(16)?,
                fallback_model: r.get(17)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
