//! Shared fixtures for end-to-end pipeline scenarios: a scripted chat
//! client, questionnaire structures and valid artifact payloads.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use posture_core::errors::CallError;
use posture_core::keypool::crypto::SecretCipher;
use posture_core::keypool::KeyPool;
use posture_core::model::{
    AnswerValue, AssessmentStructure, Question, QuestionType, RawResponse, Section,
};
use posture_core::providers::llm::{ChatClient, ChatRequest, ChatResponse};
use posture_core::scoring::ScaleKind;
use posture_core::storage::Store;
use posture_core::OrchestratorConfig;

pub type Responder =
    Box<dyn Fn(&ChatRequest) -> Result<ChatResponse, CallError> + Send + Sync>;

/// Chat client driven by a closure, recording every request it sees.
pub struct ResponderClient {
    responder: Responder,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub keys_seen: Mutex<Vec<String>>,
}

impl ResponderClient {
    pub fn new(responder: Responder) -> Arc<Self> {
        Arc::new(Self {
            responder,
            requests: Mutex::new(Vec::new()),
            keys_seen: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl ChatClient for ResponderClient {
    async fn complete(&self, api_key: &str, req: &ChatRequest) -> Result<ChatResponse, CallError> {
        self.keys_seen.lock().unwrap().push(api_key.to_string());
        self.requests.lock().unwrap().push(req.clone());
        (self.responder)(req)
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// Chat client that plays back a fixed sequence of results.
pub struct SequenceClient {
    responses: Mutex<VecDeque<Result<ChatResponse, CallError>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub keys_seen: Mutex<Vec<String>>,
}

impl SequenceClient {
    pub fn new(responses: Vec<Result<ChatResponse, CallError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            keys_seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatClient for SequenceClient {
    async fn complete(&self, api_key: &str, req: &ChatRequest) -> Result<ChatResponse, CallError> {
        self.keys_seen.lock().unwrap().push(api_key.to_string());
        self.requests.lock().unwrap().push(req.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CallError::Other("script exhausted".into())))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

pub fn ok_response(text: String) -> Result<ChatResponse, CallError> {
    Ok(ChatResponse {
        text,
        model: "scripted".into(),
        tokens_prompt: 1000,
        tokens_completion: 400,
        finish_reason: Some("stop".into()),
    })
}

pub fn test_store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store.init_schema().unwrap();
    store
}

pub fn test_pool(store: &Store, secrets: &[(&str, &str)]) -> Arc<KeyPool> {
    let cipher = SecretCipher::from_key_bytes(&[11u8; 32]).unwrap();
    let pool = Arc::new(KeyPool::new(store.clone(), cipher, 1000));
    for (label, secret) in secrets {
        pool.add(label, secret, "test").unwrap();
    }
    pool
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_retries: 2,
        retry_delay: std::time::Duration::from_millis(1),
        request_timeout: std::time::Duration::from_secs(5),
        ..OrchestratorConfig::default()
    }
}

/// One-section structure: three weight-10 maturity questions.
pub fn iam_structure() -> AssessmentStructure {
    AssessmentStructure {
        sections: vec![Section {
            id: "section_4".into(),
            title: "Identity & Access Management".into(),
            description: "Authentication, authorization and access reviews".into(),
            questions: vec![
                question("q1", "Is MFA enforced for administrative accounts?"),
                question("q2", "How mature is your access review process?"),
                question("q3", "Is privileged access centrally managed?"),
            ],
        }],
    }
}

fn question(id: &str, text: &str) -> Question {
    Question {
        id: id.into(),
        text: text.into(),
        question_type: QuestionType::MultipleChoice,
        weight: 10,
        scale_type: Some(ScaleKind::Maturity),
        options: Vec::new(),
    }
}

pub fn iam_responses() -> Vec<RawResponse> {
    vec![
        RawResponse {
            question_id: "q1".into(),
            answer: AnswerValue::Single("managed".into()),
            comment: None,
        },
        RawResponse {
            question_id: "q2".into(),
            answer: AnswerValue::Single("defined".into()),
            comment: None,
        },
        RawResponse {
            question_id: "q3".into(),
            answer: AnswerValue::Single("ad_hoc".into()),
            comment: None,
        },
    ]
}

/// A section artifact the validator accepts for any signal count >= 1.
pub fn valid_section_artifact_json() -> String {
    json!({
        "risk_level": "Medium-High",
        "risk_explanation": "Foundational identity controls exist, but privileged access is not centrally managed and reviews are informal, leaving administrative accounts exposed.",
        "strengths": ["Access management processes are documented and partially enforced"],
        "gaps": [{
            "gap": "Privileged access is managed ad hoc without central control or session auditing",
            "linked_signals": ["Q1"],
            "severity": "High"
        }],
        "recommendations": [{
            "action": "Deploy a privileged access management solution for administrative credentials",
            "rationale": "Ad hoc privileged access is the most likely path to a full compromise",
            "linked_signals": ["Q1"],
            "effort": "Medium",
            "impact": "High",
            "timeline": "60-day",
            "references": ["NIST CSF PR.AC-4"]
        }],
        "benchmarks": [{
            "control": "Privileged Access Management",
            "status": "Partial",
            "framework": "CIS",
            "reference": "CIS 5.4"
        }],
        "confidence_score": 0.82
    })
    .to_string()
}

/// Artifact violating the severity/risk coupling: Critical gap with
/// Medium risk. Never validates.
pub fn invalid_section_artifact_json() -> String {
    let mut v: serde_json::Value = serde_json::from_str(&valid_section_artifact_json()).unwrap();
    v["gaps"][0]["severity"] = "Critical".into();
    v["risk_level"] = "Medium".into();
    v.to_string()
}

pub fn valid_synthesis_json() -> String {
    json!({
        "executive_summary": "The organization maintains a developing security posture with credible identity governance foundations. Privileged access management and access review maturity are the dominant risks; both are addressable within one quarter with focused investment and executive sponsorship.",
        "overall_risk_level": "Medium-High",
        "overall_risk_explanation": "Identity weaknesses dominate the risk picture across the assessed domains and amplify the impact of any perimeter or endpoint compromise.",
        "cross_cutting_themes": [],
        "top_10_initiatives": [],
        "quick_wins": ["Enable MFA for all administrative accounts"],
        "long_term_strategy": "Progress identity and access maturity from ad hoc to managed over the next two quarters, then extend central control to workload identities and third-party access, with quarterly measurement against the assessment baseline.",
        "confidence_score": 0.8
    })
    .to_string()
}

/// Responder that answers section prompts with a valid artifact and the
/// synthesis prompt with a valid synthesis.
pub fn happy_responder() -> Responder {
    Box::new(|req: &ChatRequest| {
        if req.prompt.contains("OVERALL SECURITY SCORE") {
            ok_response(valid_synthesis_json())
        } else {
            ok_response(valid_section_artifact_json())
        }
    })
}
