//! Section-analysis prompt: enumerated Q1..QN signals, optional benchmark
//! block, JSON schema fragment and strict output requirements.

use std::fmt::Write as _;

use crate::model::{Section, SectionResponse};

use super::truncate_chars;

#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub max_comment_chars: usize,
    pub max_context_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_comment_chars: 500,
            max_context_chars: 300,
        }
    }
}

pub fn build_section_prompt(
    section: &Section,
    responses: &[SectionResponse],
    curated_context: &str,
    limits: PromptLimits,
) -> String {
    let mut signals = String::new();
    for (i, resp) in responses.iter().enumerate() {
        let _ = writeln!(signals, "Q{}: {} (weight:{})", i + 1, resp.answer, resp.weight);
        if let Some(context) = resp.context.as_deref().filter(|c| !c.is_empty()) {
            let _ = writeln!(
                signals,
                "    Context: {}",
                truncate_chars(context, limits.max_context_chars)
            );
        }
        if let Some(comment) = resp.comment.as_deref().filter(|c| !c.is_empty()) {
            let _ = writeln!(
                signals,
                "    User comment: {}",
                truncate_chars(comment, limits.max_comment_chars)
            );
        }
    }

    format!(
        r#"Analyze this cybersecurity assessment section and provide comprehensive, structured insights.

Section: {title}
Description: {description}

Signals:
{signals}
{curated_context}

Provide your analysis as JSON matching this schema:
{{
  "risk_level": "Low|Medium|Medium-High|High|Critical",
  "risk_explanation": "Detailed explanation (120-180 words)",
  "strengths": ["strength1", "strength2", "strength3"],
  "gaps": [
    {{
      "gap": "description (25-40 words)",
      "linked_signals": ["Q1", "Q7"],
      "severity": "Low|Medium|High|Critical"
    }}
  ],
  "recommendations": [
    {{
      "action": "specific action (15-25 words)",
      "rationale": "why this matters (30-50 words)",
      "linked_signals": ["Q3"],
      "effort": "Low|Medium|High",
      "impact": "Low|Medium|High|Critical",
      "timeline": "30-day|60-day|90-day",
      "references": ["NIST CSF PR.AC-1"]
    }}
  ],
  "benchmarks": [
    {{
      "control": "Multi-Factor Authentication",
      "status": "Implemented|Partial|Missing|Not Applicable",
      "framework": "NIST|ISO|OWASP|CIS",
      "reference": "NIST CSF PR.AC-7"
    }}
  ],
  "confidence_score": 0.85
}}

WORD COUNT REQUIREMENTS (TOTAL: 300-400 WORDS):
- risk_explanation: 120-180 words covering current posture, identified risks and business impact
- strengths: 3-5 items, each 20-30 words with context
- gaps: 3-5 items, each description 25-40 words with a clear explanation
- recommendations: 3-5 items, each rationale 30-50 words of actionable justification

STRICT REQUIREMENTS:
1. Every gap MUST reference at least one signal (Q1, Q2, etc.) that supports it
2. Every recommendation MUST reference the signals it addresses
3. Use exact signal IDs from the list above (Q1-Q{n})
4. Severity levels must match: Critical (score <40%), High (40-60%), Medium (60-80%), Low (>80%)
5. Effort estimates: Low (<1 week), Medium (1-4 weeks), High (>1 month)
6. Timeline: 30-day for Critical/High, 60-day for Medium, 90-day for Low
7. Benchmark status must follow the signals: Missing if answer=No, Partial if answer=Partial, Implemented if answer=Yes
8. If any gap has severity "Critical", risk_level MUST be "High" or "Critical"
9. Keep each gap description under 900 characters

Respond with JSON only, no prose outside the JSON object.
"#,
        title = section.title,
        description = section.description,
        signals = signals.trim_end(),
        curated_context = curated_context,
        n = responses.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> Section {
        Section {
            id: "section_4".into(),
            title: "Identity & Access Management".into(),
            description: "Authentication and access control".into(),
            questions: Vec::new(),
        }
    }

    fn resp(answer: &str, weight: u32) -> SectionResponse {
        SectionResponse {
            question: "q".into(),
            answer: answer.into(),
            weight,
            comment: None,
            context: None,
        }
    }

    #[test]
    fn signals_are_enumerated_with_weights() {
        let prompt = build_section_prompt(
            &section(),
            &[resp("yes", 10), resp("partially_implemented", 8)],
            "",
            PromptLimits::default(),
        );
        assert!(prompt.contains("Q1: yes (weight:10)"));
        assert!(prompt.contains("Q2: partially_implemented (weight:8)"));
        assert!(prompt.contains("(Q1-Q2)"));
        assert!(prompt.contains("Section: Identity & Access Management"));
    }

    #[test]
    fn comment_and_context_lines_are_indented_and_truncated() {
        let mut r = resp("no", 10);
        r.comment = Some("c".repeat(600));
        r.context = Some("x".repeat(400));
        let prompt = build_section_prompt(
            &section(),
            &[r],
            "",
            PromptLimits {
                max_comment_chars: 500,
                max_context_chars: 300,
            },
        );
        let comment_line = prompt
            .lines()
            .find(|l| l.contains("User comment:"))
            .unwrap();
        assert!(comment_line.starts_with("    "));
        assert_eq!(comment_line.matches('c').count(), 500);

        let context_line = prompt.lines().find(|l| l.contains("Context:")).unwrap();
        assert_eq!(context_line.matches('x').count(), 300);
    }

    #[test]
    fn benchmark_block_is_embedded_verbatim() {
        let prompt = build_section_prompt(
            &section(),
            &[resp("yes", 10)],
            "\n\nRELEVANT INDUSTRY CONTROLS:\nNIST CSF PR.AC-7: MFA\n",
            PromptLimits::default(),
        );
        assert!(prompt.contains("RELEVANT INDUSTRY CONTROLS:"));
    }

    #[test]
    fn prompt_demands_json_only_output() {
        let prompt = build_section_prompt(&section(), &[resp("yes", 10)], "", PromptLimits::default());
        assert!(prompt.contains("JSON only"));
        assert!(prompt.contains("risk_level must be \"High\" or \"Critical\"")
            || prompt.contains("risk_level MUST be \"High\" or \"Critical\""));
    }
}
