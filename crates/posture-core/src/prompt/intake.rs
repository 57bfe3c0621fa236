//! Discovery-intake recommendation prompt. The advisor instructions and
//! the profile/catalogue payload are concatenated into the single user
//! message the wire contract allows.

use crate::intake::{SectionMetadata, UserProfile};

pub fn build_intake_prompt(profile: &UserProfile, sections: &[SectionMetadata]) -> String {
    let profile_json =
        serde_json::to_string_pretty(profile).unwrap_or_else(|_| "{}".to_string());
    let sections_json =
        serde_json::to_string_pretty(sections).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are an experienced cybersecurity architect helping organisations decide which security assessment sections are most relevant to them.

You are given:
* A brief user profile (role, organisation size, sector, environment, goals).
* A list of available assessment sections with names, descriptions and tags.

Your task:
* Recommend which sections the user should complete NOW, to get the most value for their time.
* Prioritise sections based on the user's environment (cloud vs on-prem, OT/ICS, custom apps), their goals, and the time they are willing to spend.
* If a section is clearly not applicable (e.g. OT/ICS for a SaaS-only company), call that out in `excluded_sections`.

Here is the user's profile (JSON):

{profile_json}

Here are the available assessment sections (JSON):

{sections_json}

Based on this user's context, goals and time preference:

1. Recommend which sections they should complete now.
2. Prioritise them as:
   - "must_do" for the most critical ones,
   - "should_do" for important but secondary ones,
   - "optional" for nice-to-have sections.
3. If any sections are clearly not applicable, include them in "excluded_sections" with a reason.

Respond with STRICT, VALID JSON ONLY in this exact structure, using only the section IDs provided, with confidence scores between 0.0 and 1.0:

{{
  "recommended_sections": [
    {{
      "id": "section_4",
      "priority": "must_do",
      "reason": "Identity and access management is critical for all organisations.",
      "confidence": 0.95
    }}
  ],
  "excluded_sections": [
    {{
      "id": "section_18",
      "reason": "User does not have OT/ICS or industrial control systems.",
      "confidence": 0.99
    }}
  ]
}}

No extra text, comments or explanations outside the JSON."#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{IntakeAnswers, TimePreference};

    #[test]
    fn prompt_embeds_profile_and_catalogue() {
        let answers = IntakeAnswers {
            role: "ciso".into(),
            org_size: "200-1000".into(),
            sector: "manufacturing".into(),
            environment: "hybrid".into(),
            system_types: vec!["ot_ics".into()],
            cloud_providers: vec!["aws".into()],
            primary_goal: "overall posture".into(),
            primary_goal_detail: None,
            time_preference: TimePreference::Quick,
        };
        let profile = UserProfile::from_answers(&answers);
        let sections = vec![SectionMetadata {
            id: "section_4".into(),
            name: "Identity & Access Management".into(),
            description: "IAM".into(),
            tags: vec!["identity".into()],
        }];

        let prompt = build_intake_prompt(&profile, &sections);
        assert!(prompt.contains("\"has_ot_ics\": true"));
        assert!(prompt.contains("section_4"));
        assert!(prompt.contains("STRICT, VALID JSON ONLY"));
    }
}
