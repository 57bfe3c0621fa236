//! Scoring scales and the per-question scoring function.
//!
//! Scores are integers in `[0, weight]`; the only case that reduces
//! `max_score` is a `not_applicable` answer, which removes the question
//! from the section denominator entirely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{AnswerValue, AssessmentStructure, Question, QuestionType, RawResponse};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    Maturity,
    FrequencyReview,
    FrequencyMonitoring,
    Coverage,
    Implementation,
    Governance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFlag {
    Unknown,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionScore {
    pub score: u32,
    pub max_score: u32,
    pub flags: Vec<ScoreFlag>,
}

const UNKNOWN_SLUGS: &[&str] = &["unknown", "not_sure", "don't_know", "dont_know"];
const NOT_APPLICABLE_SLUGS: &[&str] = &[
    "not_applicable",
    "n/a",
    "na",
    "not_applicable_to_our_organization",
];

/// Normalize an option slug for lookup: lowercase, separators to `_`,
/// `n_a`/`na` collapse to `not_applicable`.
pub fn normalize_option_value(value: &str) -> String {
    let normalized: String = value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '/' => '_',
            other => other,
        })
        .collect();
    if normalized == "n_a" || normalized == "na" {
        "not_applicable".to_string()
    } else {
        normalized
    }
}

fn scale_table(kind: ScaleKind) -> &'static [(&'static str, f64)] {
    match kind {
        ScaleKind::Maturity => &[
            ("optimized", 1.0),
            ("managed", 0.75),
            ("defined", 0.5),
            ("ad_hoc", 0.25),
        ],
        ScaleKind::FrequencyReview => &[
            ("quarterly", 1.0),
            ("annually", 0.75),
            ("only_after_changes", 0.5),
            ("only_after_major_changes", 0.5),
            ("as_needed", 0.5),
            ("no_formal_review", 0.0),
            ("never", 0.0),
        ],
        ScaleKind::FrequencyMonitoring => &[
            ("continuously", 1.0),
            ("daily", 0.9),
            ("weekly", 0.8),
            ("monthly", 0.7),
            ("quarterly", 0.6),
            ("only_when_issues", 0.3),
            ("not_monitored", 0.0),
            ("never", 0.0),
        ],
        ScaleKind::Coverage => &[
            ("76_100", 1.0),
            ("51_75", 0.75),
            ("26_50", 0.5),
            ("0_25", 0.25),
        ],
        ScaleKind::Implementation => &[
            ("fully_implemented", 1.0),
            ("partially_implemented", 0.5),
            ("planned", 0.25),
            ("not_implemented", 0.0),
        ],
        ScaleKind::Governance => &[
            ("documented_approved_maintained", 1.0),
            ("documented_but_stale", 0.5),
            ("informal_understanding", 0.25),
            ("no_strategy", 0.0),
        ],
    }
}

/// Weight multiplier and flags for a single option value.
///
/// Sentinels take precedence over the scale table. A slug missing from a
/// known scale scores full weight, matching the questionnaire's historical
/// lenient behavior.
pub fn option_weight(scale: Option<ScaleKind>, option_value: &str) -> (f64, Vec<ScoreFlag>) {
    let slug = normalize_option_value(option_value);

    if UNKNOWN_SLUGS.contains(&slug.as_str()) {
        return (0.0, vec![ScoreFlag::Unknown]);
    }
    if NOT_APPLICABLE_SLUGS.contains(&slug.as_str()) {
        return (0.0, vec![ScoreFlag::NotApplicable]);
    }

    let Some(kind) = scale else {
        // No scale: any non-empty answer earns full weight.
        let mult = if slug.is_empty() { 0.0 } else { 1.0 };
        return (mult, Vec::new());
    };

    let mult = scale_table(kind)
        .iter()
        .find(|(k, _)| *k == slug)
        .map(|(_, w)| *w)
        .unwrap_or(1.0);
    (mult, Vec::new())
}

/// Score one answered question. Multi-select takes the best-scoring
/// variant; `not_applicable` anywhere in the selection zeroes the
/// denominator for the whole question.
pub fn score_question(question: &Question, answer: &AnswerValue) -> QuestionScore {
    match question.question_type {
        QuestionType::YesNo => {
            let score = match answer {
                AnswerValue::Single(s) if normalize_option_value(s) == "yes" => question.weight,
                _ => 0,
            };
            QuestionScore {
                score,
                max_score: question.weight,
                flags: Vec::new(),
            }
        }
        QuestionType::MultipleChoice | QuestionType::MultipleSelect => {
            let variants = answer.variants();
            if variants.is_empty() {
                return QuestionScore {
                    score: 0,
                    max_score: question.weight,
                    flags: Vec::new(),
                };
            }

            let mut best = 0.0_f64;
            let mut flags = Vec::new();
            for variant in variants {
                let slug = question.map_numeric_to_slug(variant);
                let (mult, variant_flags) = option_weight(question.scale_type, &slug);
                for f in variant_flags {
                    if !flags.contains(&f) {
                        flags.push(f);
                    }
                }
                best = best.max(mult);
            }

            if flags.contains(&ScoreFlag::NotApplicable) {
                return QuestionScore {
                    score: 0,
                    max_score: 0,
                    flags,
                };
            }

            QuestionScore {
                score: (f64::from(question.weight) * best) as u32,
                max_score: question.weight,
                flags,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SectionScore {
    pub score: u32,
    pub max_score: u32,
    pub percentage: f64,
    pub completion_rate: f64,
    pub responses_count: usize,
    pub total_questions: usize,
    pub unknown_count: usize,
    pub not_applicable_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OverallScore {
    pub score: u32,
    pub max_score: u32,
    pub percentage: f64,
    pub unknown_count: usize,
    pub not_applicable_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssessmentScores {
    pub sections: BTreeMap<String, SectionScore>,
    pub overall: OverallScore,
}

impl AssessmentScores {
    pub fn section(&self, id: &str) -> Option<&SectionScore> {
        self.sections.get(id)
    }
}

/// Score every section. Unanswered questions count toward `max_score`
/// only (they drag the percentage down without contributing score).
pub fn score_sections(
    structure: &AssessmentStructure,
    responses: &[RawResponse],
) -> AssessmentScores {
    let by_question: BTreeMap<&str, &RawResponse> = responses
        .iter()
        .map(|r| (r.question_id.as_str(), r))
        .collect();

    let mut scores = AssessmentScores::default();
    for section in &structure.sections {
        let mut s = SectionScore {
            total_questions: section.questions.len(),
            ..Default::default()
        };

        for question in &section.questions {
            match by_question.get(question.id.as_str()) {
                Some(resp) => {
                    s.responses_count += 1;
                    let q = score_question(question, &resp.answer);
                    s.score += q.score;
                    s.max_score += q.max_score;
                    if q.flags.contains(&ScoreFlag::Unknown) {
                        s.unknown_count += 1;
                    }
                    if q.flags.contains(&ScoreFlag::NotApplicable) {
                        s.not_applicable_count += 1;
                    }
                }
                None => s.max_score += question.weight,
            }
        }

        s.completion_rate = if section.questions.is_empty() {
            0.0
        } else {
            s.responses_count as f64 / section.questions.len() as f64 * 100.0
        };
        s.percentage = if s.max_score > 0 {
            f64::from(s.score) / f64::from(s.max_score) * 100.0
        } else {
            0.0
        };

        scores.overall.score += s.score;
        scores.overall.max_score += s.max_score;
        scores.overall.unknown_count += s.unknown_count;
        scores.overall.not_applicable_count += s.not_applicable_count;
        scores.sections.insert(section.id.clone(), s);
    }

    scores.overall.percentage = if scores.overall.max_score > 0 {
        f64::from(scores.overall.score) / f64::from(scores.overall.max_score) * 100.0
    } else {
        0.0
    };
    scores
}

/// Questions answered with an `unknown`-like value, grouped per section.
/// Surfaced on reports as data-quality blind spots.
pub fn blind_spots(
    structure: &AssessmentStructure,
    responses: &[RawResponse],
) -> BTreeMap<String, Vec<String>> {
    let by_question: BTreeMap<&str, &RawResponse> = responses
        .iter()
        .map(|r| (r.question_id.as_str(), r))
        .collect();

    let mut out = BTreeMap::new();
    for section in &structure.sections {
        let mut ids = Vec::new();
        for question in &section.questions {
            if let Some(resp) = by_question.get(question.id.as_str()) {
                let has_unknown = resp.answer.variants().iter().any(|v| {
                    let slug = normalize_option_value(&question.map_numeric_to_slug(v));
                    UNKNOWN_SLUGS.contains(&slug.as_str())
                });
                if has_unknown {
                    ids.push(question.id.clone());
                }
            }
        }
        if !ids.is_empty() {
            out.insert(section.id.clone(), ids);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionOption;

    fn q(id: &str, weight: u32, scale: Option<ScaleKind>) -> Question {
        Question {
            id: id.into(),
            text: format!("question {id}"),
            question_type: QuestionType::MultipleChoice,
            weight,
            scale_type: scale,
            options: Vec::new(),
        }
    }

    #[test]
    fn sentinels_override_scale_tables() {
        let (w, flags) = option_weight(Some(ScaleKind::Maturity), "Unknown");
        assert_eq!(w, 0.0);
        assert_eq!(flags, vec![ScoreFlag::Unknown]);

        let (w, flags) = option_weight(Some(ScaleKind::Coverage), "N/A");
        assert_eq!(w, 0.0);
        assert_eq!(flags, vec![ScoreFlag::NotApplicable]);
    }

    #[test]
    fn normalization_collapses_separators() {
        assert_eq!(normalize_option_value("Ad-Hoc"), "ad_hoc");
        assert_eq!(normalize_option_value("only after changes"), "only_after_changes");
        assert_eq!(normalize_option_value("n/a"), "not_applicable");
        assert_eq!(normalize_option_value("NA"), "not_applicable");
    }

    #[test]
    fn score_never_exceeds_weight_and_na_zeroes_denominator() {
        let question = q("q1", 10, Some(ScaleKind::Maturity));
        for answer in ["optimized", "managed", "defined", "ad_hoc", "unknown"] {
            let s = score_question(&question, &AnswerValue::Single(answer.into()));
            assert!(s.score <= question.weight);
            if answer == "unknown" {
                assert_eq!(s.score, 0);
                assert_eq!(s.max_score, 10, "unknown keeps the denominator");
            }
        }

        let s = score_question(&question, &AnswerValue::Single("not_applicable".into()));
        assert_eq!(s.max_score, 0);
        assert_eq!(s.score, 0);
        assert_eq!(s.flags, vec![ScoreFlag::NotApplicable]);
    }

    #[test]
    fn multi_select_best_answer_wins() {
        let question = Question {
            question_type: QuestionType::MultipleSelect,
            ..q("q1", 10, Some(ScaleKind::FrequencyMonitoring))
        };
        let s = score_question(
            &question,
            &AnswerValue::Multi(vec!["monthly".into(), "daily".into()]),
        );
        // daily (0.9) beats monthly (0.7); integer truncation of 9.0
        assert_eq!(s.score, 9);
        assert_eq!(s.max_score, 10);
    }

    #[test]
    fn yes_no_collapses_to_full_or_zero() {
        let question = Question {
            question_type: QuestionType::YesNo,
            ..q("q1", 8, None)
        };
        let yes = score_question(&question, &AnswerValue::Single("yes".into()));
        let no = score_question(&question, &AnswerValue::Single("no".into()));
        assert_eq!(yes.score, 8);
        assert_eq!(no.score, 0);
        assert_eq!(no.max_score, 8);
    }

    #[test]
    fn section_scores_match_worked_example() {
        // Three weight-10 maturity questions: optimized, not_applicable, managed
        // => score 10 + 0 + 7 = 17, max 10 + 0 + 10 = 20, 85%.
        let structure = AssessmentStructure {
            sections: vec![crate::model::Section {
                id: "s1".into(),
                title: "Patching".into(),
                description: String::new(),
                questions: vec![
                    q("q1", 10, Some(ScaleKind::Maturity)),
                    q("q2", 10, Some(ScaleKind::Maturity)),
                    q("q3", 10, Some(ScaleKind::Maturity)),
                ],
            }],
        };
        let responses = vec![
            RawResponse {
                question_id: "q1".into(),
                answer: AnswerValue::Single("optimized".into()),
                comment: None,
            },
            RawResponse {
                question_id: "q2".into(),
                answer: AnswerValue::Single("not_applicable".into()),
                comment: None,
            },
            RawResponse {
                question_id: "q3".into(),
                answer: AnswerValue::Single("managed".into()),
                comment: None,
            },
        ];

        let scores = score_sections(&structure, &responses);
        let s = scores.section("s1").unwrap();
        assert_eq!(s.score, 17);
        assert_eq!(s.max_score, 20);
        assert!((s.percentage - 85.0).abs() < f64::EPSILON);
        assert_eq!(s.not_applicable_count, 1);
    }

    #[test]
    fn numeric_answers_score_via_option_mapping() {
        let question = Question {
            options: vec![
                QuestionOption {
                    value: "ad_hoc".into(),
                    label: None,
                    explanation: None,
                },
                QuestionOption {
                    value: "optimized".into(),
                    label: None,
                    explanation: None,
                },
            ],
            ..q("q1", 10, Some(ScaleKind::Maturity))
        };
        let s = score_question(&question, &AnswerValue::Single("2".into()));
        assert_eq!(s.score, 10);
    }

    #[test]
    fn blind_spots_collect_unknown_answers() {
        let structure = AssessmentStructure {
            sections: vec![crate::model::Section {
                id: "s1".into(),
                title: "Visibility".into(),
                description: String::new(),
                questions: vec![q("q1", 10, Some(ScaleKind::Maturity)), q("q2", 10, None)],
            }],
        };
        let responses = vec![
            RawResponse {
                question_id: "q1".into(),
                answer: AnswerValue::Single("not_sure".into()),
                comment: None,
            },
            RawResponse {
                question_id: "q2".into(),
                answer: AnswerValue::Single("yes".into()),
                comment: None,
            },
        ];
        let spots = blind_spots(&structure, &responses);
        assert_eq!(spots.get("s1").map(Vec::len), Some(1));
    }
}
