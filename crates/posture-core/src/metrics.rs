//! Per-call cost accounting and the daily rollup surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage::rows::{DailyMetricsRow, GenerationMetadataRow};
use crate::storage::Store;

pub use crate::storage::metrics::FINISH_REASON_CACHE_HIT;

/// USD per 1K tokens. Unknown models bill at the gpt-4 rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPrice {
    pub prompt: f64,
    pub completion: f64,
}

#[derive(Debug, Clone)]
pub struct Pricing {
    table: BTreeMap<String, ModelPrice>,
}

impl Default for Pricing {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            "gpt-4".to_string(),
            ModelPrice {
                prompt: 0.010,
                completion: 0.030,
            },
        );
        table.insert(
            "gpt-4-turbo".to_string(),
            ModelPrice {
                prompt: 0.010,
                completion: 0.030,
            },
        );
        table.insert(
            "gpt-3.5-turbo".to_string(),
            ModelPrice {
                prompt: 0.0005,
                completion: 0.0015,
            },
        );
        Self { table }
    }
}

impl Pricing {
    /// Apply a JSON override of the form
    /// `{"model": {"prompt": usd_per_1k, "completion": usd_per_1k}}`.
    pub fn with_override(override_json: Option<&str>) -> anyhow::Result<Self> {
        let mut pricing = Self::default();
        if let Some(json) = override_json {
            let overrides: BTreeMap<String, ModelPrice> = serde_json::from_str(json)?;
            pricing.table.extend(overrides);
        }
        Ok(pricing)
    }

    pub fn cost_usd(&self, model: &str, tokens_prompt: i64, tokens_completion: i64) -> f64 {
        let price = self
            .table
            .get(model)
            .or_else(|| self.table.get("gpt-4"))
            .expect("gpt-4 price always present");
        (tokens_prompt as f64 * price.prompt + tokens_completion as f64 * price.completion) / 1000.0
    }
}

/// Records one metadata row per `(report, section, call)` and exposes the
/// rollup and per-report breakdowns.
#[derive(Clone)]
pub struct MetricsService {
    store: Store,
    pricing: Pricing,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportCost {
    pub report_id: String,
    pub total_sections: usize,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
    pub degraded_sections: usize,
}

impl MetricsService {
    pub fn new(store: Store, pricing: Pricing) -> Self {
        Self { store, pricing }
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn record(&self, row: &GenerationMetadataRow) {
        if let Err(e) = self.store.insert_generation_metadata(row) {
            tracing::warn!(report_id = %row.report_id, error = %e, "failed to record call metrics");
        }
    }

    /// Roll up a day (`YYYY-MM-DD`); defaults to yesterday, matching the
    /// scheduled job.
    pub fn rollup_daily(&self, date: Option<&str>) -> anyhow::Result<DailyMetricsRow> {
        let date = match date {
            Some(d) => d.to_string(),
            None => (chrono::Utc::now() - chrono::Duration::days(1))
                .format("%Y-%m-%d")
                .to_string(),
        };
        self.store.rollup_daily_metrics(&date)
    }

    pub fn report_cost(&self, report_id: &str) -> anyhow::Result<ReportCost> {
        let rows = self.store.report_generation_rows(report_id)?;
        Ok(ReportCost {
            report_id: report_id.to_string(),
            total_sections: rows.len(),
            total_tokens: rows
                .iter()
                .map(|r| r.tokens_prompt + r.tokens_completion)
                .sum(),
            total_cost_usd: rows.iter().map(|r| r.total_cost_usd).sum(),
            degraded_sections: rows.iter().filter(|r| r.is_degraded).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_use_their_price() {
        let p = Pricing::default();
        // 1000 prompt + 1000 completion tokens
        assert!((p.cost_usd("gpt-4", 1000, 1000) - 0.040).abs() < 1e-9);
        assert!((p.cost_usd("gpt-4-turbo", 1000, 1000) - 0.040).abs() < 1e-9);
        assert!((p.cost_usd("gpt-3.5-turbo", 1000, 1000) - 0.002).abs() < 1e-9);
    }

    #[test]
    fn unknown_models_fall_back_to_gpt4_price() {
        let p = Pricing::default();
        assert_eq!(
            p.cost_usd("experimental-model", 500, 100),
            p.cost_usd("gpt-4", 500, 100)
        );
    }

    #[test]
    fn override_extends_the_table() {
        let p = Pricing::with_override(Some(
            r#"{"gpt-4-turbo": {"prompt": 0.005, "completion": 0.015}}"#,
        ))
        .unwrap();
        assert!((p.cost_usd("gpt-4-turbo", 1000, 1000) - 0.020).abs() < 1e-9);
        // Untouched models keep their defaults.
        assert!((p.cost_usd("gpt-3.5-turbo", 1000, 1000) - 0.002).abs() < 1e-9);
    }

    #[test]
    fn report_cost_aggregates_rows() {
        let store = crate::storage::test_store();
        let svc = MetricsService::new(store, Pricing::default());
        let row = GenerationMetadataRow {
            id: String::new(),
            report_id: "r1".into(),
            section_id: Some("s1".into()),
            prompt_version: "v2".into(),
            schema_version: "1.1".into(),
            model: "gpt-4-turbo".into(),
            temperature: 0.7,
            max_tokens: 1600,
            tokens_prompt: 1000,
            tokens_completion: 500,
            total_cost_usd: 0.025,
            latency_ms: 1500,
            finish_reason: Some("stop".into()),
            attempt_count: 1,
            is_degraded: false,
            error_code: None,
            error_message: None,
            fallback_model: None,
        };
        svc.record(&row);
        let mut degraded = row.clone();
        degraded.section_id = Some("s2".into());
        degraded.is_degraded = true;
        svc.record(&degraded);

        let cost = svc.report_cost("r1").unwrap();
        assert_eq!(cost.total_sections, 2);
        assert_eq!(cost.total_tokens, 3000);
        assert_eq!(cost.degraded_sections, 1);
        assert!((cost.total_cost_usd - 0.05).abs() < 1e-9);
    }
}
