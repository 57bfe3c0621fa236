use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRow {
    pub id: String,
    pub label: String,
    pub encrypted_key: String,
    pub active: bool,
    pub usage_count: i64,
    pub last_used_at: Option<String>,
    pub cooldown_until: Option<String>,
    pub error_count: i64,
    pub created_at: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRow {
    pub id: String,
    pub section_id: String,
    pub answers_hash: String,
    pub prompt_version: String,
    pub schema_version: String,
    pub model: String,
    pub artifact_json: String,
    pub tokens_prompt: i64,
    pub tokens_completion: i64,
    pub total_cost_usd: f64,
    pub hit_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadataRow {
    pub id: String,
    pub report_id: String,
    pub section_id: Option<String>,
    pub prompt_version: String,
    pub schema_version: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub tokens_prompt: i64,
    pub tokens_completion: i64,
    pub total_cost_usd: f64,
    pub latency_ms: i64,
    pub finish_reason: Option<String>,
    pub attempt_count: i64,
    pub is_degraded: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub fallback_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyMetricsRow {
    pub date: String,
    pub total_reports: i64,
    pub total_sections: i64,
    pub total_tokens_prompt: i64,
    pub total_tokens_completion: i64,
    pub total_cost_usd: f64,
    pub avg_latency_ms: i64,
    pub cache_hit_rate: f64,
    pub success_rate: f64,
    pub degraded_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeSessionRow {
    pub id: String,
    pub user_id: Option<String>,
    pub user_profile_json: String,
    pub ai_raw_response_json: Option<String>,
    pub final_selected_section_ids: Option<String>,
    pub time_preference: String,
    pub used_fallback: bool,
    pub created_at: String,
}
