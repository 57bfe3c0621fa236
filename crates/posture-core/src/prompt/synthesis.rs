//! Cross-section synthesis prompt: per-section summary lines plus the
//! executive-strategy benchmark block.

use std::fmt::Write as _;

/// Compact view of one analyzed section fed to the synthesis call.
#[derive(Debug, Clone)]
pub struct SectionSummary {
    pub title: String,
    pub score_pct: f64,
    pub risk_level: String,
    pub top_gaps: Vec<String>,
    pub top_recommendations: Vec<String>,
    /// Set when the section artifact is a degraded placeholder; the
    /// summary line is annotated so the model can discount it.
    pub degraded: bool,
}

pub fn build_synthesis_prompt(
    summaries: &[SectionSummary],
    overall_score: f64,
    curated_context: &str,
) -> String {
    let mut summaries_text = String::new();
    for s in summaries {
        let degraded_marker = if s.degraded { " (degraded)" } else { "" };
        let _ = write!(
            summaries_text,
            "\nSection: {} (Score: {:.1}%){}\nRisk Level: {}\nTop Gaps: {}\nTop Recommendations: {}\n",
            s.title,
            s.score_pct,
            degraded_marker,
            s.risk_level,
            s.top_gaps.iter().take(3).cloned().collect::<Vec<_>>().join(", "),
            s.top_recommendations
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        );
    }

    format!(
        r#"You are a cybersecurity executive advisor. Analyze these section summaries from a comprehensive security assessment and provide strategic synthesis.

OVERALL SECURITY SCORE: {overall_score:.1}%

SECTION SUMMARIES:
{summaries_text}
{curated_context}

Provide your synthesis as JSON matching this schema:

{{
  "executive_summary": "2-3 paragraph overview for C-level executives highlighting current posture, key risks, and strategic recommendations",
  "overall_risk_level": "Low|Medium|Medium-High|High|Critical",
  "overall_risk_explanation": "Detailed explanation of overall risk considering all domains",
  "cross_cutting_themes": [
    {{
      "theme": "Identity and Access Management Gaps",
      "description": "Detailed description of the theme",
      "affected_domains": ["identity", "access_control", "network"],
      "severity": "High"
    }}
  ],
  "top_10_initiatives": [
    {{
      "priority": 1,
      "title": "Implement Enterprise-Wide MFA",
      "description": "Deploy multi-factor authentication across all systems and user accounts",
      "affected_domains": ["identity", "access_control"],
      "effort": "Medium",
      "impact": "Critical",
      "timeline": "30-day",
      "dependencies": [],
      "success_metrics": ["100% MFA adoption"],
      "owner": "Security Team"
    }}
  ],
  "quick_wins": [
    "Enable MFA for all admin accounts (1 week)"
  ],
  "long_term_strategy": "Strategic direction for next 6-12 months including maturity progression, team building, and program development",
  "confidence_score": 0.85
}}

REQUIREMENTS:
1. Executive summary must be business-focused, not technical
2. Identify 3-5 cross-cutting themes that span multiple domains
3. Prioritize initiatives by (impact x urgency) / effort, ordered by priority
4. Map dependencies: higher-priority items that must complete before others
5. Success metrics must be specific and measurable
6. Quick wins must be achievable in under 30 days with low effort
7. Long-term strategy should align with industry best practices
8. Discount any section marked (degraded); its analysis was unavailable

Respond with JSON only, no prose outside the JSON object.
"#,
    )
}
