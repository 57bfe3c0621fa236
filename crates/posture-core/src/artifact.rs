//! Validated JSON payloads produced by LLM calls: per-section analysis
//! artifacts and the cross-section synthesis artifact.
//!
//! Validation is typed: serde handles shape, the `parse_and_validate`
//! constructors enforce the cross-field rules the schema cannot express
//! (signal indices, severity/risk coupling, length bounds). Overlong gap
//! and action text is clamped before validation so a single verbose field
//! does not degrade a whole section.

use serde::{Deserialize, Serialize};

use crate::errors::CallError;

pub const SECTION_SCHEMA_VERSION: &str = "1.1";
pub const SYNTHESIS_SCHEMA_VERSION: &str = "1.0";

const MAX_GAP_CHARS: usize = 900;
const MAX_ACTION_CHARS: usize = 450;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    #[serde(rename = "Medium-High")]
    MediumHigh,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Effort {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Timeline {
    #[serde(rename = "30-day")]
    Day30,
    #[serde(rename = "60-day")]
    Day60,
    #[serde(rename = "90-day")]
    Day90,
    #[serde(rename = "90+ day")]
    Day90Plus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BenchmarkStatus {
    Implemented,
    Partial,
    Missing,
    #[serde(rename = "Not Applicable")]
    NotApplicable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    pub gap: String,
    pub linked_signals: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub rationale: String,
    pub linked_signals: Vec<String>,
    pub effort: Effort,
    pub impact: Impact,
    pub timeline: Timeline,
    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRow {
    pub control: String,
    pub status: BenchmarkStatus,
    pub framework: String,
    #[serde(default)]
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionArtifact {
    #[serde(default = "default_section_schema_version")]
    pub schema_version: String,
    pub risk_level: RiskLevel,
    pub risk_explanation: String,
    pub strengths: Vec<String>,
    pub gaps: Vec<Gap>,
    pub recommendations: Vec<Recommendation>,
    pub benchmarks: Vec<BenchmarkRow>,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
}

fn default_section_schema_version() -> String {
    SECTION_SCHEMA_VERSION.to_string()
}

fn default_confidence() -> f64 {
    0.8
}

fn clamp_text(text: &mut String, max: usize) -> bool {
    if text.chars().count() > max {
        let mut truncated: String = text.chars().take(max - 3).collect();
        truncated.push_str("...");
        *text = truncated;
        true
    } else {
        false
    }
}

/// A `linked_signals` entry must be `Q<i>` with `1 <= i <= signal_count`.
fn check_signals(signals: &[String], signal_count: usize, what: &str) -> Result<(), CallError> {
    if signals.is_empty() {
        return Err(CallError::SchemaViolation {
            detail: format!("{what} must reference at least one signal"),
        });
    }
    for s in signals {
        let idx = s
            .strip_prefix('Q')
            .and_then(|rest| rest.parse::<usize>().ok())
            .ok_or_else(|| CallError::SchemaViolation {
                detail: format!("{what}: signal '{s}' must be Q<index>"),
            })?;
        if idx == 0 || idx > signal_count {
            return Err(CallError::SchemaViolation {
                detail: format!("{what}: signal '{s}' out of range 1..={signal_count}"),
            });
        }
    }
    Ok(())
}

fn check_len(value: &str, min: usize, max: usize, what: &str) -> Result<(), CallError> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(CallError::SchemaViolation {
            detail: format!("{what} length {n} outside {min}..={max}"),
        });
    }
    Ok(())
}

fn check_count<T>(items: &[T], min: usize, max: usize, what: &str) -> Result<(), CallError> {
    if items.len() < min || items.len() > max {
        return Err(CallError::SchemaViolation {
            detail: format!("{what} count {} outside {min}..={max}", items.len()),
        });
    }
    Ok(())
}

impl SectionArtifact {
    /// Parse raw model output, clamp overlong fields, then enforce the
    /// full schema. `signal_count` is the N of the Q1..QN list emitted in
    /// the prompt.
    pub fn parse_and_validate(json: &str, signal_count: usize) -> Result<Self, CallError> {
        let mut artifact: SectionArtifact =
            serde_json::from_str(json).map_err(|e| CallError::MalformedJson {
                detail: e.to_string(),
            })?;

        for gap in &mut artifact.gaps {
            if clamp_text(&mut gap.gap, MAX_GAP_CHARS) {
                tracing::warn!(max = MAX_GAP_CHARS, "clamped overlong gap text");
            }
        }
        for rec in &mut artifact.recommendations {
            if clamp_text(&mut rec.action, MAX_ACTION_CHARS) {
                tracing::warn!(max = MAX_ACTION_CHARS, "clamped overlong recommendation action");
            }
        }

        artifact.validate(signal_count)?;
        Ok(artifact)
    }

    pub fn validate(&self, signal_count: usize) -> Result<(), CallError> {
        check_len(&self.risk_explanation, 50, 1000, "risk_explanation")?;
        check_count(&self.strengths, 1, 5, "strengths")?;
        check_count(&self.gaps, 1, 5, "gaps")?;
        check_count(&self.recommendations, 1, 5, "recommendations")?;
        check_count(&self.benchmarks, 1, 10, "benchmarks")?;

        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(CallError::SchemaViolation {
                detail: format!("confidence_score {} outside [0,1]", self.confidence_score),
            });
        }

        for gap in &self.gaps {
            check_len(&gap.gap, 10, MAX_GAP_CHARS, "gap text")?;
            check_signals(&gap.linked_signals, signal_count, "gap")?;
        }
        for rec in &self.recommendations {
            check_len(&rec.action, 10, MAX_ACTION_CHARS, "recommendation action")?;
            check_signals(&rec.linked_signals, signal_count, "recommendation")?;
            // The wider effort/timeline variants belong to synthesis
            // initiatives only.
            if rec.effort == Effort::VeryHigh {
                return Err(CallError::SchemaViolation {
                    detail: "recommendation effort must be Low, Medium or High".into(),
                });
            }
            if rec.timeline == Timeline::Day90Plus {
                return Err(CallError::SchemaViolation {
                    detail: "recommendation timeline must be 30-day, 60-day or 90-day".into(),
                });
            }
        }

        let has_critical_gap = self.gaps.iter().any(|g| g.severity == Severity::Critical);
        if has_critical_gap && !matches!(self.risk_level, RiskLevel::High | RiskLevel::Critical) {
            return Err(CallError::SchemaViolation {
                detail: "risk_level must be High or Critical when a gap is Critical".into(),
            });
        }

        Ok(())
    }

    /// Minimal placeholder emitted when generation never validated.
    /// Never cached; always flagged degraded in metrics.
    pub fn degraded() -> Self {
        Self {
            schema_version: SECTION_SCHEMA_VERSION.to_string(),
            risk_level: RiskLevel::Medium,
            risk_explanation: "AI analysis temporarily unavailable for this section. \
                 The collected answers were scored normally; request a regeneration \
                 or a manual review for narrative analysis."
                .to_string(),
            strengths: vec!["Assessment data collected successfully".to_string()],
            gaps: vec![Gap {
                gap: "AI analysis unavailable for this section".to_string(),
                linked_signals: vec!["Q1".to_string()],
                severity: Severity::Low,
            }],
            recommendations: vec![Recommendation {
                action: "Retry AI analysis or request manual review".to_string(),
                rationale: "Automated analysis encountered an error".to_string(),
                linked_signals: vec!["Q1".to_string()],
                effort: Effort::Low,
                impact: Impact::Low,
                timeline: Timeline::Day30,
                references: Vec::new(),
            }],
            benchmarks: vec![BenchmarkRow {
                control: "Assessment Completion".to_string(),
                status: BenchmarkStatus::Implemented,
                framework: "Internal".to_string(),
                reference: String::new(),
            }],
            confidence_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub theme: String,
    pub description: String,
    pub affected_domains: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initiative {
    pub priority: u32,
    pub title: String,
    pub description: String,
    pub affected_domains: Vec<String>,
    pub effort: Effort,
    pub impact: Impact,
    pub timeline: Timeline,
    #[serde(default)]
    pub dependencies: Vec<u32>,
    pub success_metrics: Vec<String>,
    #[serde(default = "default_owner")]
    pub owner: String,
}

fn default_owner() -> String {
    "Security Team".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisArtifact {
    #[serde(default = "default_synthesis_schema_version")]
    pub schema_version: String,
    pub executive_summary: String,
    pub overall_risk_level: RiskLevel,
    pub overall_risk_explanation: String,
    pub cross_cutting_themes: Vec<Theme>,
    pub top_10_initiatives: Vec<Initiative>,
    pub quick_wins: Vec<String>,
    pub long_term_strategy: String,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
}

fn default_synthesis_schema_version() -> String {
    SYNTHESIS_SCHEMA_VERSION.to_string()
}

impl SynthesisArtifact {
    pub fn parse_and_validate(json: &str) -> Result<Self, CallError> {
        let artifact: SynthesisArtifact =
            serde_json::from_str(json).map_err(|e| CallError::MalformedJson {
                detail: e.to_string(),
            })?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn validate(&self) -> Result<(), CallError> {
        check_len(&self.executive_summary, 100, 2000, "executive_summary")?;
        check_count(&self.cross_cutting_themes, 0, 5, "cross_cutting_themes")?;
        check_count(&self.top_10_initiatives, 0, 10, "top_10_initiatives")?;
        check_count(&self.quick_wins, 0, 5, "quick_wins")?;

        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(CallError::SchemaViolation {
                detail: format!("confidence_score {} outside [0,1]", self.confidence_score),
            });
        }

        let mut last = 0;
        for initiative in &self.top_10_initiatives {
            if initiative.priority < 1 || initiative.priority > 10 {
                return Err(CallError::SchemaViolation {
                    detail: format!("initiative priority {} outside 1..=10", initiative.priority),
                });
            }
            if initiative.priority < last {
                return Err(CallError::SchemaViolation {
                    detail: "initiatives must be ordered by priority".into(),
                });
            }
            last = initiative.priority;
            if initiative.affected_domains.is_empty() {
                return Err(CallError::SchemaViolation {
                    detail: "initiative must name at least one affected domain".into(),
                });
            }
            if initiative.success_metrics.is_empty() {
                return Err(CallError::SchemaViolation {
                    detail: "initiative must define success metrics".into(),
                });
            }
        }

        Ok(())
    }

    /// Fallback synthesis restating the overall score; directs the reader
    /// to the section-level output.
    pub fn minimal(overall_score: f64) -> Self {
        let overall_risk_level = if overall_score >= 60.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };
        Self {
            schema_version: SYNTHESIS_SCHEMA_VERSION.to_string(),
            executive_summary: format!(
                "Security assessment completed with an overall score of {overall_score:.1}%. \
                 Detailed analysis is available in the section-by-section breakdown. \
                 Cross-section AI synthesis was temporarily unavailable for this report."
            ),
            overall_risk_level,
            overall_risk_explanation:
                "Automated cross-domain synthesis could not be generated; manual review \
                 of the per-section analyses is recommended to prioritise remediation."
                    .to_string(),
            cross_cutting_themes: Vec::new(),
            top_10_initiatives: Vec::new(),
            quick_wins: vec!["Review section-by-section recommendations".to_string()],
            long_term_strategy:
                "Conduct a comprehensive security program review with a qualified consultant, \
                 using the section-level gaps and recommendations in this report as the input \
                 for a phased, risk-based roadmap."
                    .to_string(),
            confidence_score: 0.0,
        }
    }
}
