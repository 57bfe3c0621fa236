//! Rate-limit rotation: a 429 on the first key cools it down and the
//! retry proceeds on the second key.

mod common;

use posture_core::errors::CallError;
use posture_core::pipeline::Orchestrator;

use common::*;

#[tokio::test]
async fn rate_limited_key_cools_down_and_the_pool_rotates() {
    let store = test_store();
    let pool = test_pool(
        &store,
        &[("key-a", "sk-test-key-aaaa"), ("key-b", "sk-test-key-bbbb")],
    );

    let client = SequenceClient::new(vec![
        Err(CallError::from_status(429, "Rate limit reached")),
        ok_response(valid_section_artifact_json()),
        ok_response(valid_synthesis_json()),
    ]);
    let orchestrator = Orchestrator::new(
        store.clone(),
        pool.clone(),
        client.clone(),
        fast_config(),
    )
    .unwrap();

    let insights = orchestrator
        .generate_report("report-1", &iam_structure(), &iam_responses())
        .await
        .unwrap();
    assert!(!insights.sections["section_4"].degraded);

    // The retry used a different key than the 429'd first attempt.
    let keys = client.keys_seen.lock().unwrap().clone();
    assert_ne!(keys[0], keys[1]);

    // The first key is cooling down for roughly two minutes.
    let listed = pool.list(true).unwrap();
    let cooling = listed
        .iter()
        .find(|c| c.cooldown_until.is_some())
        .expect("one key cooling down");
    assert_eq!(cooling.error_count, 1);

    let until: chrono::DateTime<chrono::Utc> = cooling
        .cooldown_until
        .as_deref()
        .unwrap()
        .parse()
        .unwrap();
    let delta = until - chrono::Utc::now();
    assert!(delta > chrono::Duration::seconds(100), "delta: {delta}");
    assert!(delta <= chrono::Duration::seconds(121), "delta: {delta}");
}
