//! Intake session persistence: profile, raw LLM response, final selection.

use rusqlite::{params, OptionalExtension};

use super::rows::IntakeSessionRow;
use super::{now_ts, Store};

impl Store {
    pub fn insert_intake_session(&self, row: &IntakeSessionRow) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO assessment_intake_sessions(id, user_id, user_profile_json, \
                 ai_raw_response_json, final_selected_section_ids, time_preference, \
                 used_fallback, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id,
                row.user_id,
                row.user_profile_json,
                row.ai_raw_response_json,
                row.final_selected_section_ids,
                row.time_preference,
                row.used_fallback as i64,
                now_ts(),
            ],
        )?;
        Ok(())
    }

    pub fn get_intake_session(&self, id: &str) -> anyhow::Result<Option<IntakeSessionRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, user_id, user_profile_json, ai_raw_response_json, \
                        final_selected_section_ids, time_preference, used_fallback, created_at \
                 FROM assessment_intake_sessions WHERE id = ?1",
                params![id],
                |r| {
                    Ok(IntakeSessionRow {
                        id: r.get(0)?,
                        user_id: r.get(1)?,
                        user_profile_json: r.get(2)?,
                        ai_raw_response_json: r.get(3)?,
                        final_selected_section_ids: r.get(4)?,
                        time_preference: r.get(5)?,
                        used_fallback: r.get::<_, i64>(6)? != 0,
                        created_at: r.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
