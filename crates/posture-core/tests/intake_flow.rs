//! Intake recommender end-to-end: LLM-driven selection with guardrails,
//! and the deterministic fallback when the LLM path fails twice.

mod common;

use posture_core::errors::CallError;
use posture_core::intake::{
    IntakeAnswers, IntakeRecommender, Priority, TimePreference, SECTION_CLOUD,
    SECTION_GOVERNANCE, SECTION_IAM, SECTION_INCIDENT, SECTION_OT_ICS,
};

use common::*;

fn answers(time_preference: TimePreference) -> IntakeAnswers {
    IntakeAnswers {
        role: "it_manager".into(),
        org_size: "50-200".into(),
        sector: "logistics".into(),
        environment: "hybrid".into(),
        system_types: vec!["public_web_apps".into()],
        cloud_providers: vec!["aws".into()],
        primary_goal: "understand overall posture".into(),
        primary_goal_detail: None,
        time_preference,
    }
}

#[tokio::test]
async fn llm_failure_twice_falls_back_deterministically() {
    let store = test_store();
    let pool = test_pool(&store, &[("a", "sk-test-key-0001")]);
    let client = SequenceClient::new(vec![
        Err(CallError::from_status(500, "first failure")),
        Err(CallError::from_status(500, "second failure")),
    ]);
    let recommender =
        IntakeRecommender::new(store.clone(), pool, client.clone(), fast_config());

    let outcome = recommender
        .recommend(&answers(TimePreference::Deep), Some("user-1"))
        .await
        .unwrap();

    assert!(outcome.used_fallback);
    assert_eq!(client.requests.lock().unwrap().len(), 2, "one retry, then fallback");

    // Core trio at minimum.
    for id in [SECTION_GOVERNANCE, SECTION_IAM, SECTION_INCIDENT] {
        assert!(
            outcome.recommended_sections.iter().any(|r| r.id == id),
            "missing {id}"
        );
    }

    // aws user: cloud section is must_do.
    let cloud = outcome
        .recommended_sections
        .iter()
        .find(|r| r.id == SECTION_CLOUD)
        .expect("cloud section present");
    assert_eq!(cloud.priority, Priority::MustDo);

    // Session persisted with the fallback flag.
    let session = store
        .get_intake_session(&outcome.session_id)
        .unwrap()
        .unwrap();
    assert!(session.used_fallback);
    assert!(session.ai_raw_response_json.is_none());
    assert_eq!(session.user_id.as_deref(), Some("user-1"));
    assert!(session
        .final_selected_section_ids
        .unwrap()
        .contains(SECTION_IAM));
}

#[tokio::test]
async fn guardrails_override_llm_exclusion_of_ot_ics() {
    let store = test_store();
    let pool = test_pool(&store, &[("a", "sk-test-key-0001")]);
    let llm_json = serde_json::json!({
        "recommended_sections": [
            {"id": SECTION_GOVERNANCE, "priority": "must_do", "reason": "baseline", "confidence": 0.9}
        ],
        "excluded_sections": [
            {"id": SECTION_OT_ICS, "reason": "probably not industrial", "confidence": 0.6}
        ]
    })
    .to_string();
    let client = SequenceClient::new(vec![ok_response(llm_json)]);
    let recommender = IntakeRecommender::new(store.clone(), pool, client, fast_config());

    let mut a = answers(TimePreference::Deep);
    a.system_types.push("ot_ics".into());
    let outcome = recommender.recommend(&a, None).await.unwrap();

    assert!(!outcome.used_fallback);
    let ot = outcome
        .recommended_sections
        .iter()
        .find(|r| r.id == SECTION_OT_ICS)
        .expect("guardrail reinstates OT/ICS");
    assert_eq!(ot.priority, Priority::MustDo);
    assert!(outcome.excluded_sections.iter().all(|e| e.id != SECTION_OT_ICS));

    let session = store
        .get_intake_session(&outcome.session_id)
        .unwrap()
        .unwrap();
    assert!(!session.used_fallback);
    assert!(session.ai_raw_response_json.is_some());
}

#[tokio::test]
async fn quick_preference_trims_the_llm_selection_to_five() {
    let store = test_store();
    let pool = test_pool(&store, &[("a", "sk-test-key-0001")]);
    let recommended: Vec<serde_json::Value> = (1..=9)
        .map(|i| {
            serde_json::json!({
                "id": format!("section_{i}"),
                "priority": if i <= 3 { "must_do" } else { "should_do" },
                "reason": "relevant",
                "confidence": 0.5 + (i as f64) / 20.0
            })
        })
        .collect();
    let llm_json = serde_json::json!({
        "recommended_sections": recommended,
        "excluded_sections": []
    })
    .to_string();
    let client = SequenceClient::new(vec![ok_response(llm_json)]);
    let recommender = IntakeRecommender::new(store, pool, client, fast_config());

    let outcome = recommender
        .recommend(&answers(TimePreference::Quick), None)
        .await
        .unwrap();

    assert!(outcome.recommended_sections.len() <= 5);
    // must_do entries (including guardrail additions) come first.
    assert!(outcome.recommended_sections[0].priority == Priority::MustDo);
}
