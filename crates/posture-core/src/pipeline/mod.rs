//! The two-stage report pipeline: N section analyses under bounded
//! concurrency, then one synthesis call after every section has a
//! terminal outcome.
//!
//! Section-level degradation never aborts the report; it is flagged in
//! metrics and visible to the synthesis stage.

mod synthesis;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::artifact::{SectionArtifact, SynthesisArtifact};
use crate::benchmark::BenchmarkLibrary;
use crate::cache::{ArtifactCache, CacheKey};
use crate::config::OrchestratorConfig;
use crate::fingerprint;
use crate::keypool::KeyPool;
use crate::metrics::{MetricsService, Pricing, FINISH_REASON_CACHE_HIT};
use crate::model::{AssessmentStructure, RawResponse, Section, SectionResponse};
use crate::prompt::{build_section_prompt, PromptLimits};
use crate::providers::llm::ChatClient;
use crate::redact::PiiRedactor;
use crate::runner::{CallRunner, CallSpec};
use crate::scoring::{score_sections, AssessmentScores};
use crate::storage::rows::GenerationMetadataRow;
use crate::storage::Store;

#[derive(Debug, Clone)]
pub struct SectionOutcome {
    pub section_id: String,
    pub artifact: SectionArtifact,
    pub degraded: bool,
    pub from_cache: bool,
}

#[derive(Debug)]
pub struct ReportInsights {
    pub report_id: String,
    pub sections: BTreeMap<String, SectionOutcome>,
    pub scores: AssessmentScores,
    pub synthesis: SynthesisArtifact,
    pub synthesis_degraded: bool,
    pub redaction_count: u32,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Store,
    cache: ArtifactCache,
    redactor: PiiRedactor,
    benchmarks: Arc<BenchmarkLibrary>,
    runner: Arc<CallRunner>,
    metrics: MetricsService,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        pool: Arc<KeyPool>,
        client: Arc<dyn ChatClient>,
        config: OrchestratorConfig,
    ) -> anyhow::Result<Self> {
        let pricing = Pricing::with_override(config.pricing_override.as_deref())?;
        Ok(Self {
            cache: ArtifactCache::new(store.clone()),
            redactor: PiiRedactor::new(config.redact_pii),
            benchmarks: Arc::new(BenchmarkLibrary::bundled()),
            runner: Arc::new(CallRunner::new(pool, client)),
            metrics: MetricsService::new(store.clone(), pricing),
            store,
            config,
        })
    }

    /// Generate the full AI report for `report_id`: per-section artifacts
    /// (cache-aware) plus the executive synthesis. Callable as a plain
    /// function; the HTTP layer decides how to schedule it.
    pub async fn generate_report(
        &self,
        report_id: &str,
        structure: &AssessmentStructure,
        responses: &[RawResponse],
    ) -> anyhow::Result<ReportInsights> {
        tracing::info!(report_id, sections = structure.sections.len(), "starting AI report");

        if !self.redactor.enabled() {
            tracing::warn!(report_id, "PII redaction is disabled; prompts carry raw user text");
        }

        let scores = score_sections(structure, responses);
        let responses: Arc<Vec<RawResponse>> = Arc::new(responses.to_vec());

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_sections.max(1)));
        let mut join_set = JoinSet::new();

        for section in structure.sections.clone() {
            let permit = semaphore.clone().acquire_owned().await?;
            let this = self.clone();
            let responses = responses.clone();
            let report_id = report_id.to_string();
            join_set.spawn(async move {
                let _permit = permit;
                this.process_section(&report_id, &section, &responses).await
            });
        }

        let mut sections = BTreeMap::new();
        let mut redaction_count = 0u32;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some((outcome, redactions))) => {
                    redaction_count += redactions;
                    sections.insert(outcome.section_id.clone(), outcome);
                }
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "section task panicked"),
            }
        }

        if redaction_count > 0 {
            tracing::info!(report_id, redaction_count, "PII redactions applied to prompts");
        }

        let (synthesis, synthesis_degraded) = self
            .run_synthesis(report_id, structure, &scores, &sections)
            .await;

        tracing::info!(
            report_id,
            sections = sections.len(),
            degraded = sections.values().filter(|s| s.degraded).count(),
            synthesis_degraded,
            "AI report complete"
        );

        Ok(ReportInsights {
            report_id: report_id.to_string(),
            sections,
            scores,
            synthesis,
            synthesis_degraded,
            redaction_count,
        })
    }

    /// Build inputs, consult the cache, and fall through to a live call.
    /// Returns `None` for sections with no answered questions.
    ///
    /// The fingerprint covers the raw inputs; redaction runs only on a
    /// cache miss, immediately before prompt assembly.
    async fn process_section(
        &self,
        report_id: &str,
        section: &Section,
        responses: &[RawResponse],
    ) -> Option<(SectionOutcome, u32)> {
        let mut inputs = self.build_section_inputs(section, responses);
        if inputs.is_empty() {
            tracing::debug!(section_id = %section.id, "no responses, skipping section");
            return None;
        }

        let key = CacheKey {
            section_id: section.id.clone(),
            inputs_fingerprint: fingerprint::compute(&inputs),
            prompt_version: self.config.prompt_version.clone(),
            schema_version: self.config.schema_version.clone(),
            model: self.config.model.clone(),
        };

        if let Some(hit) = self.cache.lookup(&key, inputs.len()) {
            self.persist_artifact(report_id, &section.id, &hit.artifact);
            self.record_cache_hit(report_id, &section.id);
            return Some((
                SectionOutcome {
                    section_id: section.id.clone(),
                    artifact: hit.artifact,
                    degraded: false,
                    from_cache: true,
                },
                0,
            ));
        }

        let redactions = self.redact_inputs(&mut inputs);

        let curated = self
            .benchmarks
            .relevant_context(&section.title, &section.description, 5);
        let prompt = build_section_prompt(
            section,
            &inputs,
            &curated,
            PromptLimits {
                max_comment_chars: self.config.max_comment_chars,
                max_context_chars: self.config.max_context_chars,
            },
        );

        let spec = CallSpec::from_config(&self.config);
        let signal_count = inputs.len();
        let outcome = self
            .runner
            .run(
                &prompt,
                &spec,
                move |text| SectionArtifact::parse_and_validate(text, signal_count),
                SectionArtifact::degraded,
            )
            .await;

        let cost_usd =
            self.metrics
                .pricing()
                .cost_usd(&outcome.model, outcome.tokens_prompt, outcome.tokens_completion);

        if !outcome.degraded {
            self.cache.store(
                &key,
                &outcome.artifact,
                outcome.tokens_prompt,
                outcome.tokens_completion,
                cost_usd,
            );
        }

        self.persist_artifact(report_id, &section.id, &outcome.artifact);
        self.metrics.record(&GenerationMetadataRow {
            id: String::new(),
            report_id: report_id.to_string(),
            section_id: Some(section.id.clone()),
            prompt_version: self.config.prompt_version.clone(),
            schema_version: self.config.schema_version.clone(),
            model: outcome.model.clone(),
            temperature: f64::from(self.config.temperature),
            max_tokens: i64::from(self.config.max_tokens),
            tokens_prompt: outcome.tokens_prompt,
            tokens_completion: outcome.tokens_completion,
            total_cost_usd: cost_usd,
            latency_ms: outcome.latency_ms,
            finish_reason: outcome.finish_reason.clone(),
            attempt_count: outcome.attempt_count,
            is_degraded: outcome.degraded,
            error_code: outcome.error_code.clone(),
            error_message: outcome.error_message.clone(),
            fallback_model: outcome.fallback_model.clone(),
        });

        Some((
            SectionOutcome {
                section_id: section.id.clone(),
                artifact: outcome.artifact,
                degraded: outcome.degraded,
                from_cache: false,
            },
            redactions,
        ))
    }

    /// Join answers against the question library into the transient
    /// per-section input block. Text is raw here; the fingerprint hashes
    /// these values as the user entered them.
    fn build_section_inputs(
        &self,
        section: &Section,
        responses: &[RawResponse],
    ) -> Vec<SectionResponse> {
        let by_question: BTreeMap<&str, &RawResponse> = responses
            .iter()
            .map(|r| (r.question_id.as_str(), r))
            .collect();

        let mut inputs = Vec::new();
        for question in &section.questions {
            let Some(resp) = by_question.get(question.id.as_str()) else {
                continue;
            };
            if resp.answer.is_empty() {
                continue;
            }

            let comment = if self.config.include_comments {
                resp.comment.clone().filter(|c| !c.trim().is_empty())
            } else {
                None
            };

            let context = if self.config.include_context {
                question
                    .option_explanation(&resp.answer.display())
                    .map(|e| crate::prompt::truncate_chars(e, self.config.max_context_chars))
            } else {
                None
            };

            inputs.push(SectionResponse {
                question: question.text.clone(),
                answer: resp.answer.display(),
                weight: question.weight,
                comment,
                context,
            });
        }
        inputs
    }

    /// Scrub answers, comments and context in place before prompt
    /// assembly; returns the number of replacements.
    fn redact_inputs(&self, inputs: &mut [SectionResponse]) -> u32 {
        let mut redactions = 0u32;
        for input in inputs.iter_mut() {
            let (answer, n) = self.redactor.redact(&input.answer);
            input.answer = answer;
            redactions += n;

            let (comment, n) = self.redactor.redact_opt(input.comment.as_deref());
            input.comment = comment;
            redactions += n;

            let (context, n) = self.redactor.redact_opt(input.context.as_deref());
            input.context = context;
            redactions += n;
        }
        redactions
    }

    fn persist_artifact(&self, report_id: &str, section_id: &str, artifact: &SectionArtifact) {
        let json = match serde_json::to_string(artifact) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(section_id, error = %e, "artifact serialize failed");
                return;
            }
        };
        if let Err(e) = self.store.upsert_section_artifact(report_id, section_id, &json) {
            tracing::error!(report_id, section_id, error = %e, "artifact persist failed");
        }
    }

    fn record_cache_hit(&self, report_id: &str, section_id: &str) {
        self.metrics.record(&GenerationMetadataRow {
            id: String::new(),
            report_id: report_id.to_string(),
            section_id: Some(section_id.to_string()),
            prompt_version: self.config.prompt_version.clone(),
            schema_version: self.config.schema_version.clone(),
            model: self.config.model.clone(),
            temperature: f64::from(self.config.temperature),
            max_tokens: i64::from(self.config.max_tokens),
            tokens_prompt: 0,
            tokens_completion: 0,
            total_cost_usd: 0.0,
            latency_ms: 0,
            finish_reason: Some(FINISH_REASON_CACHE_HIT.to_string()),
            attempt_count: 0,
            is_degraded: false,
            error_code: None,
            error_message: None,
            fallback_model: None,
        });
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub(crate) fn benchmarks(&self) -> &BenchmarkLibrary {
        &self.benchmarks
    }

    pub(crate) fn runner(&self) -> &CallRunner {
        &self.runner
    }

    pub(crate) fn metrics_service(&self) -> &MetricsService {
        &self.metrics
    }
}
