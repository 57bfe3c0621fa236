//! Credential rows: insert, listing, selection and failure accounting.
//!
//! `acquire_credential` implements the selection order as one transactional
//! "select … order by … limit 1; update counters" sequence, so two
//! concurrent acquirers can never both observe identical
//! `last_used_at`/`usage_count` state.

use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::rows::CredentialRow;
use super::{now_ts, Store};

fn row_to_credential(row: &Row<'_>) -> rusqlite::Result<CredentialRow> {
    Ok(CredentialRow {
        id: row.get(0)?,
        label: row.get(1)?,
        encrypted_key: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        usage_count: row.get(4)?,
        last_used_at: row.get(5)?,
        cooldown_until: row.get(6)?,
        error_count: row.get(7)?,
        created_at: row.get(8)?,
        created_by: row.get(9)?,
    })
}

const CREDENTIAL_COLUMNS: &str = "id, label, encrypted_key, active, usage_count, \
     last_used_at, cooldown_until, error_count, created_at, created_by";

impl Store {
    pub fn insert_credential(
        &self,
        id: &str,
        label: &str,
        encrypted_key: &str,
        created_by: &str,
    ) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO openai_api_keys(id, label, encrypted_key, active, created_at, created_by) \
             VALUES (?1, ?2, ?3, 1, ?4, ?5)",
            params![id, label, encrypted_key, now_ts(), created_by],
        )?;
        Ok(())
    }

    pub fn list_credentials(&self, include_inactive: bool) -> anyhow::Result<Vec<CredentialRow>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM openai_api_keys {} ORDER BY created_at DESC",
            if include_inactive { "" } else { "WHERE active = 1" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_credential)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_credential(&self, id: &str) -> anyhow::Result<Option<CredentialRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {CREDENTIAL_COLUMNS} FROM openai_api_keys WHERE id = ?1"),
                params![id],
                row_to_credential,
            )
            .optional()?;
        Ok(row)
    }

    /// Select the next eligible credential and bump its usage counters in
    /// the same transaction. Returns `None` when no credential is eligible.
    ///
    /// Ordering: cooling-down keys last, never-used keys first, then least
    /// used, then oldest.
    pub fn acquire_credential(&self, now: &str) -> anyhow::Result<Option<CredentialRow>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let selected = tx
            .query_row(
                &format!(
                    "SELECT {CREDENTIAL_COLUMNS} FROM openai_api_keys \
                     WHERE active = 1 AND (cooldown_until IS NULL OR cooldown_until <= ?1) \
                     ORDER BY cooldown_until IS NOT NULL, cooldown_until, \
                              last_used_at IS NOT NULL, last_used_at, \
                              usage_count ASC, created_at ASC \
                     LIMIT 1"
                ),
                params![now],
                row_to_credential,
            )
            .optional()?;

        let Some(mut credential) = selected else {
            tx.commit()?;
            return Ok(None);
        };

        tx.execute(
            "UPDATE openai_api_keys SET last_used_at = ?1, usage_count = usage_count + 1 \
             WHERE id = ?2",
            params![now, credential.id],
        )?;
        tx.commit()?;

        credential.last_used_at = Some(now.to_string());
        credential.usage_count += 1;
        Ok(Some(credential))
    }

    /// Reset error accounting after a successful call.
    pub fn record_credential_success(&self, id: &str) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE openai_api_keys SET error_count = 0, cooldown_until = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Increment the consecutive error count and apply the failure policy:
    /// rate limits cool the key down exponentially (capped at 60 minutes),
    /// other errors quarantine the key after five consecutive failures.
    /// Returns `(new_error_count, cooldown_until)`.
    pub fn record_credential_failure(
        &self,
        id: &str,
        is_rate_limit: bool,
        now: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<(i64, Option<String>)> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "UPDATE openai_api_keys SET error_count = error_count + 1 WHERE id = ?1",
            params![id],
        )?;
        let error_count: i64 = tx.query_row(
            "SELECT error_count FROM openai_api_keys WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;

        let mut cooldown = None;
        if is_rate_limit {
            let minutes = 2u64
                .checked_pow(error_count.clamp(0, 32) as u32)
                .map_or(60, |m| m.min(60));
            let until = super::format_ts(now + chrono::Duration::minutes(minutes as i64));
            tx.execute(
                "UPDATE openai_api_keys SET cooldown_until = ?1 WHERE id = ?2",
                params![until, id],
            )?;
            cooldown = Some(until);
        } else if error_count >= 5 {
            tx.execute(
                "UPDATE openai_api_keys SET active = 0 WHERE id = ?1",
                params![id],
            )?;
        }

        tx.commit()?;
        Ok((error_count, cooldown))
    }

    /// Toggle active state; re-activation clears error accounting.
    pub fn toggle_credential(&self, id: &str, active: bool) -> anyhow::Result<bool> {
        let conn = self.lock();
        let updated = if active {
            conn.execute(
                "UPDATE openai_api_keys \
                 SET active = 1, error_count = 0, cooldown_until = NULL WHERE id = ?1",
                params![id],
            )?
        } else {
            conn.execute(
                "UPDATE openai_api_keys SET active = 0 WHERE id = ?1",
                params![id],
            )?
        };
        Ok(updated > 0)
    }

    pub fn delete_credential(&self, id: &str) -> anyhow::Result<bool> {
        let conn = self.lock();
        let deleted = conn.execute("DELETE FROM openai_api_keys WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Administrative override of a key's cooldown window.
    pub fn set_credential_cooldown(&self, id: &str, until: Option<&str>) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE openai_api_keys SET cooldown_until = ?1 WHERE id = ?2",
            params![until, id],
        )?;
        Ok(())
    }
}
