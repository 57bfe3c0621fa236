//! Discovery-intake recommender: maps a short questionnaire to a user
//! profile, asks the LLM which sections to present, then overlays
//! deterministic guardrails and the time-budget trim. The LLM is advisory;
//! the guardrails are not.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::errors::CallError;
use crate::keypool::KeyPool;
use crate::prompt::build_intake_prompt;
use crate::providers::llm::ChatClient;
use crate::runner::{CallRunner, CallSpec};
use crate::storage::rows::IntakeSessionRow;
use crate::storage::Store;

const BUNDLED_CATALOGUE: &str = include_str!("../resources/sections_metadata.json");

pub const SECTION_GOVERNANCE: &str = "section_1";
pub const SECTION_RISK: &str = "section_2";
pub const SECTION_IAM: &str = "section_4";
pub const SECTION_DATA_PROTECTION: &str = "section_7";
pub const SECTION_APPSEC: &str = "section_8";
pub const SECTION_CLOUD: &str = "section_9";
pub const SECTION_INCIDENT: &str = "section_10";
pub const SECTION_OT_ICS: &str = "section_18";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimePreference {
    Quick,
    Moderate,
    Deep,
}

impl TimePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Moderate => "moderate",
            Self::Deep => "deep",
        }
    }

    fn budget(&self) -> Option<usize> {
        match self {
            Self::Quick => Some(5),
            Self::Moderate => Some(8),
            Self::Deep => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeAnswers {
    pub role: String,
    pub org_size: String,
    pub sector: String,
    pub environment: String,
    #[serde(default)]
    pub system_types: Vec<String>,
    #[serde(default)]
    pub cloud_providers: Vec<String>,
    pub primary_goal: String,
    #[serde(default)]
    pub primary_goal_detail: Option<String>,
    pub time_preference: TimePreference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub role: String,
    pub org_size: String,
    pub sector: String,
    pub environment: String,
    pub system_types: Vec<String>,
    pub has_ot_ics: bool,
    pub cloud_providers: Vec<String>,
    pub primary_goal: String,
    pub primary_goal_detail: Option<String>,
    pub time_preference: TimePreference,
}

impl UserProfile {
    pub fn from_answers(answers: &IntakeAnswers) -> Self {
        Self {
            role: answers.role.clone(),
            org_size: answers.org_size.clone(),
            sector: answers.sector.clone(),
            environment: answers.environment.clone(),
            has_ot_ics: answers.system_types.iter().any(|s| s == "ot_ics"),
            system_types: answers.system_types.clone(),
            cloud_providers: answers.cloud_providers.clone(),
            primary_goal: answers.primary_goal.clone(),
            primary_goal_detail: answers.primary_goal_detail.clone(),
            time_preference: answers.time_preference,
        }
    }

    fn uses_cloud(&self) -> bool {
        !self.cloud_providers.is_empty()
            && !self
                .cloud_providers
                .iter()
                .any(|p| p.eq_ignore_ascii_case("none"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub fn load_section_catalogue() -> Vec<SectionMetadata> {
    serde_json::from_str(BUNDLED_CATALOGUE).expect("bundled sections_metadata.json parses")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    MustDo,
    ShouldDo,
    Optional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRecommendation {
    pub id: String,
    pub priority: Priority,
    pub reason: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionExclusion {
    pub id: String,
    pub reason: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecommendationSet {
    #[serde(default)]
    pub recommended_sections: Vec<SectionRecommendation>,
    #[serde(default)]
    pub excluded_sections: Vec<SectionExclusion>,
}

impl RecommendationSet {
    fn parse(json: &str) -> Result<Self, CallError> {
        let set: RecommendationSet =
            serde_json::from_str(json).map_err(|e| CallError::MalformedJson {
                detail: e.to_string(),
            })?;
        if set.recommended_sections.is_empty() {
            return Err(CallError::SchemaViolation {
                detail: "recommended_sections is empty".into(),
            });
        }
        for r in &set.recommended_sections {
            if !(0.0..=1.0).contains(&r.confidence) {
                return Err(CallError::SchemaViolation {
                    detail: format!("confidence {} outside [0,1]", r.confidence),
                });
            }
        }
        Ok(set)
    }

    fn contains(&self, id: &str) -> bool {
        self.recommended_sections.iter().any(|r| r.id == id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutcome {
    pub session_id: String,
    pub recommended_sections: Vec<SectionRecommendation>,
    pub excluded_sections: Vec<SectionExclusion>,
    pub used_fallback: bool,
}

pub struct IntakeRecommender {
    store: Store,
    runner: CallRunner,
    config: OrchestratorConfig,
}

impl IntakeRecommender {
    pub fn new(
        store: Store,
        pool: Arc<KeyPool>,
        client: Arc<dyn ChatClient>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            runner: CallRunner::new(pool, client),
            config,
        }
    }

    /// Produce the final section selection for a discovery questionnaire
    /// and persist the intake session.
    pub async fn recommend(
        &self,
        answers: &IntakeAnswers,
        user_id: Option<&str>,
    ) -> anyhow::Result<IntakeOutcome> {
        let catalogue = load_section_catalogue();
        let profile = UserProfile::from_answers(answers);

        let prompt = build_intake_prompt(&profile, &catalogue);
        let spec = CallSpec {
            model: self.config.model.clone(),
            fallback_model: None,
            max_tokens: 800,
            temperature: 0.2,
            timeout: self.config.request_timeout,
            // One retry on transient failure.
            max_retries: 2,
            retry_delay: self.config.retry_delay,
        };

        let outcome = self
            .runner
            .run(&prompt, &spec, RecommendationSet::parse, RecommendationSet::default)
            .await;

        let used_fallback = outcome.degraded;
        let raw_response = if used_fallback {
            None
        } else {
            serde_json::to_string(&outcome.artifact).ok()
        };

        let mut set = if used_fallback {
            tracing::warn!("intake LLM unavailable, using deterministic fallback selection");
            fallback_recommendations(&profile, &catalogue)
        } else {
            apply_guardrails(outcome.artifact, &profile, &catalogue)
        };
        trim_to_time_budget(&mut set, profile.time_preference);

        let session_id = Uuid::new_v4().to_string();
        let selected_ids: Vec<&str> = set
            .recommended_sections
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        self.store.insert_intake_session(&IntakeSessionRow {
            id: session_id.clone(),
            user_id: user_id.map(str::to_string),
            user_profile_json: serde_json::to_string(&profile)?,
            ai_raw_response_json: raw_response,
            final_selected_section_ids: Some(serde_json::to_string(&selected_ids)?),
            time_preference: profile.time_preference.as_str().to_string(),
            used_fallback,
            created_at: String::new(),
        })?;

        tracing::info!(
            session_id,
            selected = set.recommended_sections.len(),
            used_fallback,
            "intake recommendation complete"
        );

        Ok(IntakeOutcome {
            session_id,
            recommended_sections: set.recommended_sections,
            excluded_sections: set.excluded_sections,
            used_fallback,
        })
    }
}

fn recommend_if_known(
    set: &mut RecommendationSet,
    catalogue: &[SectionMetadata],
    id: &str,
    priority: Priority,
    reason: &str,
    confidence: f64,
) {
    if catalogue.iter().any(|s| s.id == id) && !set.contains(id) {
        set.recommended_sections.push(SectionRecommendation {
            id: id.to_string(),
            priority,
            reason: reason.to_string(),
            confidence,
        });
    }
}

/// Deterministic selection used when the LLM path failed entirely.
pub fn fallback_recommendations(
    profile: &UserProfile,
    catalogue: &[SectionMetadata],
) -> RecommendationSet {
    let mut set = RecommendationSet::default();

    for id in [SECTION_GOVERNANCE, SECTION_IAM, SECTION_INCIDENT] {
        recommend_if_known(
            &mut set,
            catalogue,
            id,
            Priority::MustDo,
            "Critical for all organizations.",
            0.9,
        );
    }

    if profile.uses_cloud() {
        recommend_if_known(
            &mut set,
            catalogue,
            SECTION_CLOUD,
            Priority::MustDo,
            "Cloud security is essential for organizations using cloud platforms.",
            0.95,
        );
    }

    if profile.has_ot_ics {
        recommend_if_known(
            &mut set,
            catalogue,
            SECTION_OT_ICS,
            Priority::MustDo,
            "OT/ICS security is critical for organizations with industrial control systems.",
            0.95,
        );
    } else if catalogue.iter().any(|s| s.id == SECTION_OT_ICS) {
        set.excluded_sections.push(SectionExclusion {
            id: SECTION_OT_ICS.to_string(),
            reason: "Organization does not have OT/ICS or industrial control systems.".to_string(),
            confidence: 0.99,
        });
    }

    let has_apps = profile
        .system_types
        .iter()
        .any(|s| s == "public_web_apps" || s == "internal_custom_apps");
    if has_apps {
        recommend_if_known(
            &mut set,
            catalogue,
            SECTION_APPSEC,
            Priority::ShouldDo,
            "Application security matters for organizations with custom or web applications.",
            0.85,
        );
    }

    let goal = profile.primary_goal.to_lowercase();
    if goal.contains("overall") || goal.contains("posture") {
        recommend_if_known(
            &mut set,
            catalogue,
            SECTION_RISK,
            Priority::ShouldDo,
            "Risk management helps understand overall security posture.",
            0.85,
        );
    }

    recommend_if_known(
        &mut set,
        catalogue,
        SECTION_DATA_PROTECTION,
        Priority::ShouldDo,
        "Data protection is important for most organizations.",
        0.8,
    );

    set
}

/// Hard business rules overlaying whatever the LLM produced.
pub fn apply_guardrails(
    mut set: RecommendationSet,
    profile: &UserProfile,
    catalogue: &[SectionMetadata],
) -> RecommendationSet {
    recommend_if_known(
        &mut set,
        catalogue,
        SECTION_IAM,
        Priority::MustDo,
        "Identity & Access Management is critical for all organizations (added by guardrail).",
        0.95,
    );

    if profile.uses_cloud() {
        if let Some(existing) = set
            .recommended_sections
            .iter_mut()
            .find(|r| r.id == SECTION_CLOUD)
        {
            if existing.priority != Priority::MustDo {
                existing.priority = Priority::MustDo;
                existing.reason.push_str(" (upgraded by guardrail)");
            }
        } else {
            recommend_if_known(
                &mut set,
                catalogue,
                SECTION_CLOUD,
                Priority::MustDo,
                "Cloud security is essential for organizations using cloud platforms \
                 (added by guardrail).",
                0.9,
            );
        }
    }

    if profile.has_ot_ics {
        set.excluded_sections.retain(|e| e.id != SECTION_OT_ICS);
        recommend_if_known(
            &mut set,
            catalogue,
            SECTION_OT_ICS,
            Priority::MustDo,
            "OT/ICS security is critical for organizations with industrial control systems \
             (added by guardrail).",
            0.95,
        );
    }

    set.recommended_sections
        .retain(|r| catalogue.iter().any(|s| s.id == r.id));
    set.excluded_sections
        .retain(|e| catalogue.iter().any(|s| s.id == e.id));

    set
}

/// Cap the selection to the user's time budget: must_do first, then
/// should_do by confidence, then optional (moderate only).
pub fn trim_to_time_budget(set: &mut RecommendationSet, pref: TimePreference) {
    let Some(budget) = pref.budget() else {
        return;
    };

    let mut must: Vec<SectionRecommendation> = Vec::new();
    let mut should: Vec<SectionRecommendation> = Vec::new();
    let mut optional: Vec<SectionRecommendation> = Vec::new();
    for r in set.recommended_sections.drain(..) {
        match r.priority {
            Priority::MustDo => must.push(r),
            Priority::ShouldDo => should.push(r),
            Priority::Optional => optional.push(r),
        }
    }
    should.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    optional.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut selected = must;
    selected.truncate(budget);
    for bucket in [should, optional] {
        let remaining = budget.saturating_sub(selected.len());
        if remaining == 0 {
            break;
        }
        selected.extend(bucket.into_iter().take(remaining));
        if pref == TimePreference::Quick {
            // quick never dips into optional
            break;
        }
    }

    set.recommended_sections = selected;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers() -> IntakeAnswers {
        IntakeAnswers {
            role: "it_manager".into(),
            org_size: "50-200".into(),
            sector: "manufacturing".into(),
            environment: "hybrid".into(),
            system_types: vec!["ot_ics".into(), "public_web_apps".into()],
            cloud_providers: vec!["aws".into()],
            primary_goal: "understand overall posture".into(),
            primary_goal_detail: None,
            time_preference: TimePreference::Deep,
        }
    }

    fn rec(id: &str, priority: Priority, confidence: f64) -> SectionRecommendation {
        SectionRecommendation {
            id: id.into(),
            priority,
            reason: "test".into(),
            confidence,
        }
    }

    #[test]
    fn profile_derives_ot_ics_fact() {
        let p = UserProfile::from_answers(&answers());
        assert!(p.has_ot_ics);
        assert!(p.uses_cloud());

        let mut no_cloud = answers();
        no_cloud.cloud_providers = vec!["None".into()];
        assert!(!UserProfile::from_answers(&no_cloud).uses_cloud());
    }

    #[test]
    fn catalogue_loads_and_contains_guardrail_sections() {
        let catalogue = load_section_catalogue();
        for id in [SECTION_IAM, SECTION_CLOUD, SECTION_OT_ICS, SECTION_GOVERNANCE] {
            assert!(catalogue.iter().any(|s| s.id == id), "missing {id}");
        }
    }

    #[test]
    fn fallback_includes_core_sections_and_cloud() {
        let profile = UserProfile::from_answers(&answers());
        let set = fallback_recommendations(&profile, &load_section_catalogue());

        for id in [SECTION_GOVERNANCE, SECTION_IAM, SECTION_INCIDENT] {
            assert!(set.contains(id), "missing {id}");
        }
        let cloud = set
            .recommended_sections
            .iter()
            .find(|r| r.id == SECTION_CLOUD)
            .expect("cloud section present for aws user");
        assert_eq!(cloud.priority, Priority::MustDo);
        assert!(set.contains(SECTION_OT_ICS));
        assert!(set.contains(SECTION_APPSEC));
        assert!(set.contains(SECTION_RISK));
        assert!(set.contains(SECTION_DATA_PROTECTION));
    }

    #[test]
    fn fallback_excludes_ot_ics_without_industrial_systems() {
        let mut a = answers();
        a.system_types = vec!["saas".into()];
        let set = fallback_recommendations(&UserProfile::from_answers(&a), &load_section_catalogue());
        assert!(!set.contains(SECTION_OT_ICS));
        assert!(set.excluded_sections.iter().any(|e| e.id == SECTION_OT_ICS));
    }

    #[test]
    fn guardrails_force_ot_ics_back_in_when_llm_excluded_it() {
        let profile = UserProfile::from_answers(&answers());
        let llm_set = RecommendationSet {
            recommended_sections: vec![rec(SECTION_GOVERNANCE, Priority::MustDo, 0.9)],
            excluded_sections: vec![SectionExclusion {
                id: SECTION_OT_ICS.into(),
                reason: "not relevant".into(),
                confidence: 0.7,
            }],
        };

        let out = apply_guardrails(llm_set, &profile, &load_section_catalogue());
        let ot = out
            .recommended_sections
            .iter()
            .find(|r| r.id == SECTION_OT_ICS)
            .expect("guardrail reinstates OT/ICS");
        assert_eq!(ot.priority, Priority::MustDo);
        assert!(out.excluded_sections.iter().all(|e| e.id != SECTION_OT_ICS));
        // IAM force-included too.
        assert!(out.contains(SECTION_IAM));
    }

    #[test]
    fn guardrails_upgrade_cloud_priority_for_cloud_users() {
        let profile = UserProfile::from_answers(&answers());
        let llm_set = RecommendationSet {
            recommended_sections: vec![
                rec(SECTION_CLOUD, Priority::Optional, 0.6),
                rec(SECTION_IAM, Priority::MustDo, 0.9),
            ],
            excluded_sections: vec![],
        };
        let out = apply_guardrails(llm_set, &profile, &load_section_catalogue());
        let cloud = out
            .recommended_sections
            .iter()
            .find(|r| r.id == SECTION_CLOUD)
            .unwrap();
        assert_eq!(cloud.priority, Priority::MustDo);
        assert!(cloud.reason.contains("upgraded by guardrail"));
    }

    #[test]
    fn guardrails_drop_unknown_ids() {
        let profile = UserProfile::from_answers(&answers());
        let llm_set = RecommendationSet {
            recommended_sections: vec![
                rec("section_999", Priority::MustDo, 0.9),
                rec(SECTION_IAM, Priority::MustDo, 0.9),
            ],
            excluded_sections: vec![],
        };
        let out = apply_guardrails(llm_set, &profile, &load_section_catalogue());
        assert!(!out.contains("section_999"));
    }

    #[test]
    fn quick_trim_caps_at_five_must_do_first() {
        let mut set = RecommendationSet {
            recommended_sections: vec![
                rec("section_1", Priority::MustDo, 0.9),
                rec("section_4", Priority::MustDo, 0.95),
                rec("section_10", Priority::MustDo, 0.9),
                rec("section_9", Priority::MustDo, 0.95),
                rec("section_2", Priority::ShouldDo, 0.7),
                rec("section_7", Priority::ShouldDo, 0.9),
                rec("section_8", Priority::Optional, 0.99),
            ],
            excluded_sections: vec![],
        };
        trim_to_time_budget(&mut set, TimePreference::Quick);

        assert_eq!(set.recommended_sections.len(), 5);
        let must: Vec<_> = set
            .recommended_sections
            .iter()
            .filter(|r| r.priority == Priority::MustDo)
            .collect();
        assert_eq!(must.len(), 4);
        // The single remaining slot goes to the highest-confidence
        // should_do, never to optional.
        assert_eq!(set.recommended_sections[4].id, "section_7");
    }

    #[test]
    fn moderate_trim_caps_at_eight_and_admits_optional() {
        let mut set = RecommendationSet {
            recommended_sections: (0..6)
                .map(|i| rec(&format!("m{i}"), Priority::MustDo, 0.9))
                .chain((0..1).map(|i| rec(&format!("s{i}"), Priority::ShouldDo, 0.8)))
                .chain((0..3).map(|i| rec(&format!("o{i}"), Priority::Optional, 0.7)))
                .collect(),
            excluded_sections: vec![],
        };
        trim_to_time_budget(&mut set, TimePreference::Moderate);
        assert_eq!(set.recommended_sections.len(), 8);
        assert!(set.recommended_sections.iter().any(|r| r.id.starts_with('o')));
    }

    #[test]
    fn deep_preference_is_untrimmed() {
        let mut set = RecommendationSet {
            recommended_sections: (0..12)
                .map(|i| rec(&format!("s{i}"), Priority::Optional, 0.5))
                .collect(),
            excluded_sections: vec![],
        };
        trim_to_time_budget(&mut set, TimePreference::Deep);
        assert_eq!(set.recommended_sections.len(), 12);
    }

    #[test]
    fn parse_rejects_empty_recommendations_and_bad_confidence() {
        assert!(RecommendationSet::parse(r#"{"recommended_sections": []}"#).is_err());
        assert!(RecommendationSet::parse(
            r#"{"recommended_sections": [{"id": "section_4", "priority": "must_do", "reason": "x", "confidence": 1.5}]}"#
        )
        .is_err());
        let ok = RecommendationSet::parse(
            r#"{"recommended_sections": [{"id": "section_4", "priority": "must_do", "reason": "x", "confidence": 0.9}]}"#,
        )
        .unwrap();
        assert_eq!(ok.recommended_sections[0].priority, Priority::MustDo);
    }
}
