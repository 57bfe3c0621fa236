//! Curated control-framework library and the compact prompt snippet built
//! from it. Read-only and deterministic: the same section title/description
//! always yields the same snippet.

use std::collections::BTreeMap;

use serde::Deserialize;

const BUNDLED_LIBRARY: &str = include_str!("../resources/benchmarks.yaml");

#[derive(Debug, Clone, Deserialize)]
pub struct Control {
    pub id: String,
    pub control: String,
    pub description: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BenchmarkLibrary {
    #[serde(default)]
    nist_csf: BTreeMap<String, Vec<Control>>,
    #[serde(default)]
    iso_27001: BTreeMap<String, Vec<Control>>,
    #[serde(default)]
    owasp_top_10: Vec<Control>,
    #[serde(default)]
    cis_controls: Vec<Control>,
}

impl BenchmarkLibrary {
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// The library shipped with the crate.
    pub fn bundled() -> Self {
        Self::from_yaml(BUNDLED_LIBRARY).expect("bundled benchmarks.yaml parses")
    }

    /// Format up to `max_controls` matching controls as a prompt block, or
    /// an empty string when nothing matches.
    pub fn relevant_context(
        &self,
        section_title: &str,
        section_description: &str,
        max_controls: usize,
    ) -> String {
        let words = extract_keywords(&format!("{section_title} {section_description}"));

        let mut matched: Vec<(&str, &Control)> = Vec::new();
        for controls in self.nist_csf.values() {
            for c in controls {
                if matches_keywords(&c.keywords, &words) {
                    matched.push(("NIST CSF", c));
                }
            }
        }
        for controls in self.iso_27001.values() {
            for c in controls {
                if matches_keywords(&c.keywords, &words) {
                    matched.push(("ISO 27001", c));
                }
            }
        }
        for c in &self.owasp_top_10 {
            if matches_keywords(&c.keywords, &words) {
                matched.push(("OWASP Top 10", c));
            }
        }
        for c in &self.cis_controls {
            if matches_keywords(&c.keywords, &words) {
                matched.push(("CIS Controls", c));
            }
        }

        matched.truncate(max_controls);
        if matched.is_empty() {
            return String::new();
        }

        let mut out = String::from("\n\nRELEVANT INDUSTRY CONTROLS:\n");
        for (framework, ctrl) in matched {
            out.push_str(&format!("\n{framework} {}: {}\n", ctrl.id, ctrl.control));
            out.push_str(&format!("  → {}\n", ctrl.description));
        }
        out.push_str("\nUse these controls as benchmarks in your analysis.\n");
        out
    }
}

fn extract_keywords(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|w| w.len() > 3)
        .map(str::to_lowercase)
        .collect()
}

fn matches_keywords(control_keywords: &[String], text_words: &[String]) -> bool {
    control_keywords.iter().any(|kw| text_words.contains(kw))
}
