//! Schema initialization. Idempotent: every statement is IF NOT EXISTS.

use rusqlite::Connection;

pub(crate) fn init(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS openai_api_keys (
            id              TEXT PRIMARY KEY,
            label           TEXT NOT NULL,
            encrypted_key   TEXT NOT NULL,
            active          INTEGER NOT NULL DEFAULT 1,
            usage_count     INTEGER NOT NULL DEFAULT 0,
            last_used_at    TEXT,
            cooldown_until  TEXT,
            error_count     INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            created_by      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ai_section_cache (
            id                TEXT PRIMARY KEY,
            section_id        TEXT NOT NULL,
            answers_hash      TEXT NOT NULL,
            prompt_version    TEXT NOT NULL,
            schema_version    TEXT NOT NULL,
            model             TEXT NOT NULL,
            artifact_json     TEXT NOT NULL,
            tokens_prompt     INTEGER NOT NULL DEFAULT 0,
            tokens_completion INTEGER NOT NULL DEFAULT 0,
            total_cost_usd    REAL NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL,
            last_used_at      TEXT,
            hit_count         INTEGER NOT NULL DEFAULT 0
        );
        CREATE UNIQUE INDEX IF NOT EXISTS ux_ai_section_cache
            ON ai_section_cache(section_id, answers_hash, prompt_version, model);

        CREATE TABLE IF NOT EXISTS ai_section_artifacts (
            id            TEXT PRIMARY KEY,
            report_id     TEXT NOT NULL,
            section_id    TEXT NOT NULL,
            artifact_json TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS ux_ai_section_artifacts
            ON ai_section_artifacts(report_id, section_id);

        CREATE TABLE IF NOT EXISTS ai_synthesis_artifacts (
            id             TEXT PRIMARY KEY,
            report_id      TEXT NOT NULL UNIQUE,
            artifact_json  TEXT NOT NULL,
            prompt_version TEXT NOT NULL,
            schema_version TEXT NOT NULL,
            model          TEXT NOT NULL,
            created_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ai_generation_metadata (
            id                TEXT PRIMARY KEY,
            report_id         TEXT NOT NULL,
            section_id        TEXT,
            prompt_version    TEXT NOT NULL,
            schema_version    TEXT NOT NULL,
            model             TEXT NOT NULL,
            temperature       REAL NOT NULL,
            max_tokens        INTEGER NOT NULL,
            tokens_prompt     INTEGER NOT NULL DEFAULT 0,
            tokens_completion INTEGER NOT NULL DEFAULT 0,
            total_cost_usd    REAL NOT NULL DEFAULT 0,
            latency_ms        INTEGER NOT NULL DEFAULT 0,
            finish_reason     TEXT,
            attempt_count     INTEGER NOT NULL DEFAULT 0,
            is_degraded       INTEGER NOT NULL DEFAULT 0,
            error_code        TEXT,
            error_message     TEXT,
            fallback_model    TEXT,
            created_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_ai_generation_metadata_report
            ON ai_generation_metadata(report_id);

        CREATE TABLE IF NOT EXISTS ai_daily_metrics (
            date                    TEXT PRIMARY KEY,
            total_reports           INTEGER NOT NULL DEFAULT 0,
            total_sections          INTEGER NOT NULL DEFAULT 0,
            total_tokens_prompt     INTEGER NOT NULL DEFAULT 0,
            total_tokens_completion INTEGER NOT NULL DEFAULT 0,
            total_cost_usd          REAL NOT NULL DEFAULT 0,
            avg_latency_ms          INTEGER NOT NULL DEFAULT 0,
            cache_hit_rate          REAL NOT NULL DEFAULT 0,
            success_rate            REAL NOT NULL DEFAULT 1,
            degraded_rate           REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS assessment_intake_sessions (
            id                         TEXT PRIMARY KEY,
            user_id                    TEXT,
            user_profile_json          TEXT NOT NULL,
            ai_raw_response_json       TEXT,
            final_selected_section_ids TEXT,
            time_preference            TEXT NOT NULL,
            used_fallback              INTEGER NOT NULL DEFAULT 0,
            created_at                 TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}
