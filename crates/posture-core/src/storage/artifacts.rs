//! Per-report artifact persistence. Section artifacts are idempotent per
//! `(report_id, section_id)`; synthesis is unique per report.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{now_ts, Store};

impl Store {
    pub fn upsert_section_artifact(
        &self,
        report_id: &str,
        section_id: &str,
        artifact_json: &str,
    ) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO ai_section_artifacts(id, report_id, section_id, artifact_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(report_id, section_id) DO UPDATE SET artifact_json = excluded.artifact_json",
            params![
                Uuid::new_v4().to_string(),
                report_id,
                section_id,
                artifact_json,
                now_ts(),
            ],
        )?;
        Ok(())
    }

    pub fn get_section_artifact(
        &self,
        report_id: &str,
        section_id: &str,
    ) -> anyhow::Result<Option<String>> {
        let conn = self.lock();
        let json = conn
            .query_row(
                "SELECT artifact_json FROM ai_section_artifacts \
                 WHERE report_id = ?1 AND section_id = ?2",
                params![report_id, section_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(json)
    }

    pub fn upsert_synthesis_artifact(
        &self,
        report_id: &str,
        artifact_json: &str,
        prompt_version: &str,
        schema_version: &str,
        model: &str,
    ) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO ai_synthesis_artifacts(id, report_id, artifact_json, prompt_version, \
                 schema_version, model, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(report_id) DO UPDATE SET artifact_json = excluded.artifact_json",
            params![
                Uuid::new_v4().to_string(),
                report_id,
                artifact_json,
                prompt_version,
                schema_version,
                model,
                now_ts(),
            ],
        )?;
        Ok(())
    }

    pub fn get_synthesis_artifact(&self, report_id: &str) -> anyhow::Result<Option<String>> {
        let conn = self.lock();
        let json = conn
            .query_row(
                "SELECT artifact_json FROM ai_synthesis_artifacts WHERE report_id = ?1",
                params![report_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(json)
    }
}
