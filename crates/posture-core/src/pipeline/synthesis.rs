//! Synthesis stage: runs strictly after every section task settles,
//! aggregating section artifacts into the executive summary. A failed
//! synthesis still completes the report with the minimal fallback shape.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::artifact::SynthesisArtifact;
use crate::model::AssessmentStructure;
use crate::prompt::{build_synthesis_prompt, SectionSummary};
use crate::runner::CallSpec;
use crate::scoring::AssessmentScores;
use crate::storage::rows::GenerationMetadataRow;

use super::{Orchestrator, SectionOutcome};

impl Orchestrator {
    pub(super) async fn run_synthesis(
        &self,
        report_id: &str,
        structure: &AssessmentStructure,
        scores: &AssessmentScores,
        sections: &BTreeMap<String, SectionOutcome>,
    ) -> (SynthesisArtifact, bool) {
        let summaries: Vec<SectionSummary> = structure
            .sections
            .iter()
            .filter_map(|section| {
                let outcome = sections.get(&section.id)?;
                Some(SectionSummary {
                    title: section.title.clone(),
                    score_pct: scores.section(&section.id).map_or(0.0, |s| s.percentage),
                    risk_level: serde_json::to_value(outcome.artifact.risk_level)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_else(|| "Medium".to_string()),
                    top_gaps: outcome
                        .artifact
                        .gaps
                        .iter()
                        .take(3)
                        .map(|g| g.gap.clone())
                        .collect(),
                    top_recommendations: outcome
                        .artifact
                        .recommendations
                        .iter()
                        .take(3)
                        .map(|r| r.action.clone())
                        .collect(),
                    degraded: outcome.degraded,
                })
            })
            .collect();

        let overall = scores.overall.percentage;
        let curated = self.benchmarks().relevant_context(
            "Executive Security Strategy",
            "Overall security posture and strategic initiatives",
            10,
        );
        let prompt = build_synthesis_prompt(&summaries, overall, &curated);

        let config = self.config();
        let spec = CallSpec {
            model: config.model.clone(),
            // Synthesis has no smaller stand-in; a failed call falls
            // straight through to the minimal shape.
            fallback_model: None,
            max_tokens: config.synthesis_max_tokens,
            temperature: config.synthesis_temperature,
            timeout: config.request_timeout + Duration::from_secs(30),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        };

        let outcome = self
            .runner()
            .run(
                &prompt,
                &spec,
                SynthesisArtifact::parse_and_validate,
                move || SynthesisArtifact::minimal(overall),
            )
            .await;

        let cost_usd = self.metrics_service().pricing().cost_usd(
            &outcome.model,
            outcome.tokens_prompt,
            outcome.tokens_completion,
        );

        if let Ok(json) = serde_json::to_string(&outcome.artifact) {
            if let Err(e) = self.store().upsert_synthesis_artifact(
                report_id,
                &json,
                &config.prompt_version,
                &config.schema_version,
                &outcome.model,
            ) {
                tracing::error!(report_id, error = %e, "synthesis persist failed");
            }
        }

        self.metrics_service().record(&GenerationMetadataRow {
            id: String::new(),
            report_id: report_id.to_string(),
            section_id: None,
            prompt_version: config.prompt_version.clone(),
            schema_version: config.schema_version.clone(),
            model: outcome.model.clone(),
            temperature: f64::from(config.synthesis_temperature),
            max_tokens: i64::from(config.synthesis_max_tokens),
            tokens_prompt: outcome.tokens_prompt,
            tokens_completion: outcome.tokens_completion,
            total_cost_usd: cost_usd,
            latency_ms: outcome.latency_ms,
            finish_reason: outcome.finish_reason.clone(),
            attempt_count: outcome.attempt_count,
            is_degraded: outcome.degraded,
            error_code: outcome.error_code.clone(),
            error_message: outcome.error_message.clone(),
            fallback_model: None,
        });

        (outcome.artifact, outcome.degraded)
    }
}
