//! End-to-end pipeline runs against scripted collaborators.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use supportpilot_core::stages::DRAFT_FALLBACK;
use supportpilot_core::{StepPolicy, Workflow, WorkflowConfig};
use supportpilot_knowledge::KnowledgeStore;
use supportpilot_llm::{ChatMessage, CompletionService};
use supportpilot_shared::{NewDocument, ProcessResult, Result, SearchHit, SupportPilotError};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

type Reply = Box<dyn Fn(&str, bool) -> Result<String> + Send + Sync>;

/// Completion service answering by a closure over the user message.
/// Remembers the first line of every user message and its `fast` flag.
struct Scripted {
    reply: Reply,
    calls: AtomicU32,
    seen: Mutex<Vec<(String, bool)>>,
}

impl Scripted {
    fn new(reply: impl Fn(&str, bool) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<(String, bool)> {
        self.seen.lock().expect("lock").clone()
    }

    /// Well-behaved model: valid classification, a short answer, a pass.
    fn happy() -> Arc<Self> {
        Self::new(|user, _fast| {
            Ok(if user.starts_with("Please classify") {
                r#"{"intent": "account_issue", "sentiment": "neutral", "urgency": "medium"}"#.into()
            } else if user.starts_with("Original Request") {
                r#"{"is_safe": true, "issues": [], "confidence": 0.95}"#.into()
            } else {
                "Click 'Forgot Password' on the login page and follow the emailed link.".into()
            })
        })
    }
}

#[async_trait]
impl CompletionService for Scripted {
    async fn chat(&self, messages: &[ChatMessage], fast: bool) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        let first_line = user.lines().next().unwrap_or_default().to_string();
        self.seen.lock().expect("lock").push((first_line, fast));
        (self.reply)(user, fast)
    }
}

/// Completion service that never answers.
struct Hanging;

#[async_trait]
impl CompletionService for Hanging {
    async fn chat(&self, _messages: &[ChatMessage], _fast: bool) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

/// Knowledge store returning fixed hits and remembering `(limit, threshold)`
/// of every search.
struct FixedKnowledge {
    hits: Vec<SearchHit>,
    searches: Mutex<Vec<(usize, f64)>>,
}

impl FixedKnowledge {
    fn with_hits(hits: Vec<SearchHit>) -> Arc<Self> {
        Arc::new(Self {
            hits,
            searches: Mutex::new(Vec::new()),
        })
    }

    fn password_reset() -> Arc<Self> {
        Self::with_hits(vec![SearchHit {
            id: "kb-1".into(),
            title: "Password Reset".into(),
            content: "To reset your password, click the 'Forgot Password' link on the login page."
                .into(),
            similarity: Some(0.85),
        }])
    }

    fn empty() -> Arc<Self> {
        Self::with_hits(Vec::new())
    }

    fn searches(&self) -> Vec<(usize, f64)> {
        self.searches.lock().expect("lock").clone()
    }
}

#[async_trait]
impl KnowledgeStore for FixedKnowledge {
    fn name(&self) -> &'static str {
        "fixed"
    }
    async fn search(&self, _query: &str, limit: usize, threshold: f64) -> Result<Vec<SearchHit>> {
        self.searches.lock().expect("lock").push((limit, threshold));
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
    async fn add_document(&self, _doc: NewDocument) -> Result<Option<String>> {
        Ok(None)
    }
    async fn count(&self) -> Result<u64> {
        Ok(self.hits.len() as u64)
    }
    async fn clear(&self) -> Result<u64> {
        Ok(0)
    }
    async fn list(&self) -> Result<Vec<SearchHit>> {
        Ok(self.hits.clone())
    }
}

struct DownKnowledge;

#[async_trait]
impl KnowledgeStore for DownKnowledge {
    fn name(&self) -> &'static str {
        "down"
    }
    async fn search(&self, _query: &str, _limit: usize, _threshold: f64) -> Result<Vec<SearchHit>> {
        Err(SupportPilotError::Knowledge("connection refused".into()))
    }
    async fn add_document(&self, _doc: NewDocument) -> Result<Option<String>> {
        Err(SupportPilotError::Knowledge("connection refused".into()))
    }
    async fn count(&self) -> Result<u64> {
        Err(SupportPilotError::Knowledge("connection refused".into()))
    }
    async fn clear(&self) -> Result<u64> {
        Err(SupportPilotError::Knowledge("connection refused".into()))
    }
    async fn list(&self) -> Result<Vec<SearchHit>> {
        Err(SupportPilotError::Knowledge("connection refused".into()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(timeout: Duration, max_retries: u32) -> WorkflowConfig {
    WorkflowConfig {
        policy: StepPolicy {
            timeout,
            max_retries,
        },
        ..WorkflowConfig::default()
    }
}

fn workflow(
    completion: Arc<dyn CompletionService>,
    knowledge: Arc<dyn KnowledgeStore>,
) -> Workflow {
    Workflow::new(completion, knowledge, config(Duration::from_secs(5), 2))
}

const STAGE_NAMES: [(&str, &str); 5] = [
    ("ClassifierAgent", "classify_request"),
    ("RetrieverAgent", "retrieve_knowledge"),
    ("WriterAgent", "generate_response"),
    ("GuardAgent", "validate_response"),
    ("LoggerAgent", "final_evaluation"),
];

fn assert_full_trace(result: &ProcessResult) {
    let names: Vec<_> = result
        .trace
        .iter()
        .map(|r| (r.agent_name.as_str(), r.step_name.as_str()))
        .collect();
    assert_eq!(names, STAGE_NAMES);
}

fn assert_terminal(result: &ProcessResult) {
    assert_eq!(result.trace.len(), 1);
    assert_eq!(result.trace[0].agent_name, "Workflow");
    assert_eq!(result.trace[0].step_name, "error");
    assert!(result.sources.is_empty());
    assert_eq!(result.metrics.latency_ms, 0);
    assert_eq!(result.metrics.token_usage, 0);
    assert!(
        result
            .answer
            .starts_with("An error occurred while processing your request: ")
    );
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn password_reset_happy_path() {
    let completion = Scripted::happy();
    let knowledge = FixedKnowledge::password_reset();
    let wf = Workflow::new(
        completion.clone(),
        knowledge.clone(),
        WorkflowConfig::default(),
    );
    let result = wf.process_request("I need to reset my password").await;

    assert_eq!(knowledge.searches(), [(5, 0.7)]);
    assert_eq!(
        completion.seen(),
        [
            ("Please classify this support request:".to_string(), true),
            ("Customer Request:".to_string(), false),
            ("Original Request:".to_string(), true),
        ]
    );

    assert_full_trace(&result);
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].title, "Password Reset");
    assert_eq!(result.sources[0].similarity_score, 0.85);
    assert!(result.answer.contains("Forgot Password"));
    assert!(result.metrics.token_usage >= 100);

    let classify = &result.trace[0];
    assert_eq!(classify.output["intent"], "account_issue");
    let retrieve = &result.trace[1];
    assert_eq!(retrieve.output["sources_found"], 1);
    assert_eq!(retrieve.output["sources"][0]["score"], 0.85);
    assert_eq!(retrieve.input["intent"], "account_issue");
    let validate = &result.trace[3];
    assert_eq!(validate.output["is_safe"], true);
    let evaluate = &result.trace[4];
    assert_eq!(evaluate.output["evaluation"]["success"], true);
    assert_eq!(evaluate.output["evaluation"]["agents_executed"], 4);
    assert!(result.trace.iter().all(|r| !r.is_error()));
}

#[tokio::test]
async fn empty_request_still_completes() {
    let wf = workflow(Scripted::happy(), FixedKnowledge::empty());
    let result = wf.process_request("").await;

    assert_full_trace(&result);
    assert!(result.sources.is_empty());
    assert!(result.metrics.token_usage >= 100);
}

#[tokio::test]
async fn malformed_classification_uses_fallback_triple() {
    let completion = Scripted::new(|user, _| {
        Ok(if user.starts_with("Please classify") {
            "It's probably about billing?".into()
        } else if user.starts_with("Original Request") {
            r#"{"is_safe": true, "issues": []}"#.into()
        } else {
            "Here is some help.".into()
        })
    });
    let result = workflow(completion, FixedKnowledge::empty())
        .process_request("my card was charged twice")
        .await;

    assert_full_trace(&result);
    let output = &result.trace[0].output;
    assert_eq!(output["intent"], "general_question");
    assert_eq!(output["sentiment"], "neutral");
    assert_eq!(output["urgency"], "medium");
    assert!(!result.trace[0].is_error());
}

#[tokio::test]
async fn classification_labels_stay_within_enums() {
    let completion = Scripted::new(|user, _| {
        Ok(if user.starts_with("Please classify") {
            r#"{"intent": "rant", "sentiment": "furious", "urgency": "yesterday"}"#.into()
        } else {
            "ok".into()
        })
    });
    let result = workflow(completion, FixedKnowledge::empty())
        .process_request("!!!")
        .await;

    let output = &result.trace[0].output;
    assert_eq!(output["intent"], "general_question");
    assert_eq!(output["sentiment"], "neutral");
    assert_eq!(output["urgency"], "medium");
}

#[tokio::test]
async fn zero_sources_still_validates() {
    let wf = workflow(Scripted::happy(), FixedKnowledge::empty());
    let result = wf.process_request("Do you have a dark mode?").await;

    assert_full_trace(&result);
    assert_eq!(result.trace[1].output["sources_found"], 0);
    assert_eq!(result.trace[3].output["is_safe"], true);
    assert_eq!(result.trace[4].input["validation_passed"], true);
}

#[tokio::test]
async fn retrieval_failure_is_absorbed() {
    let wf = workflow(Scripted::happy(), Arc::new(DownKnowledge));
    let result = wf.process_request("I need to reset my password").await;

    assert_full_trace(&result);
    assert!(result.sources.is_empty());
    assert_eq!(result.trace[1].output["error"], "knowledge base error: connection refused");
    assert!(result.answer.contains("Forgot Password"));
}

#[tokio::test]
async fn unparsable_validation_is_permissive() {
    let completion = Scripted::new(|user, _| {
        Ok(if user.starts_with("Original Request") {
            "Looks good to me.".into()
        } else if user.starts_with("Please classify") {
            "{}".into()
        } else {
            "Try restarting the app.".into()
        })
    });
    let result = workflow(completion, FixedKnowledge::empty())
        .process_request("app crashes")
        .await;

    let validate = &result.trace[3];
    assert_eq!(validate.output["is_safe"], true);
    assert_eq!(validate.output["issues"][0], "Unable to parse validation response");
    assert_eq!(validate.output["confidence"], 0.5);
    assert_eq!(result.trace[4].output["evaluation"]["success"], true);
}

#[tokio::test]
async fn uppercase_fenced_verdict_is_honoured() {
    let completion = Scripted::new(|user, _| {
        Ok(if user.starts_with("Original Request") {
            "```JSON\n{\"is_safe\": false, \"issues\": [\"Promises a refund\"]}\n```".into()
        } else if user.starts_with("Please classify") {
            "{}".into()
        } else {
            "We will refund you in full today.".into()
        })
    });
    let result = workflow(completion, FixedKnowledge::empty())
        .process_request("refund me")
        .await;

    let validate = &result.trace[3];
    assert_eq!(validate.output["is_safe"], false);
    assert_eq!(validate.output["issues"][0], "Promises a refund");
    assert_eq!(result.trace[4].output["evaluation"]["success"], false);
}

#[tokio::test]
async fn failed_validation_call_is_restrictive() {
    let completion = Scripted::new(|user, _| {
        if user.starts_with("Original Request") {
            Err(SupportPilotError::Completion("HTTP 503".into()))
        } else if user.starts_with("Please classify") {
            Ok("{}".into())
        } else {
            Ok("Try restarting the app.".into())
        }
    });
    let result = workflow(completion, FixedKnowledge::empty())
        .process_request("app crashes")
        .await;

    assert_full_trace(&result);
    assert!(result.trace[3].is_error());
    let evaluation = &result.trace[4].output["evaluation"];
    assert_eq!(evaluation["validation_passed"], false);
    assert_eq!(evaluation["success"], false);
    assert_eq!(evaluation["issues"][0], "Validation failed due to system error");
}

#[tokio::test]
async fn erroring_completion_degrades_without_aborting() {
    let completion =
        Scripted::new(|_, _| Err(SupportPilotError::Network("connection reset".into())));
    let result = workflow(completion.clone(), FixedKnowledge::password_reset())
        .process_request("I need to reset my password")
        .await;

    assert_full_trace(&result);
    assert_eq!(result.answer, DRAFT_FALLBACK);
    assert!(result.trace[0].is_error());
    assert!(result.trace[2].is_error());
    assert!(result.trace[3].is_error());
    assert!(!result.trace[4].is_error());
    // Stage-level fallbacks do not trigger harness retries.
    assert_eq!(completion.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn panicking_completion_takes_terminal_path() {
    let completion = Scripted::new(|_, _| panic!("completion backend exploded"));
    let wf = Workflow::new(
        completion.clone(),
        FixedKnowledge::password_reset(),
        config(Duration::from_secs(5), 2),
    );
    let result = wf.process_request("I need to reset my password").await;

    assert_terminal(&result);
    assert!(result.answer.contains("completion backend exploded"));
    assert_eq!(completion.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn hanging_completion_times_out_to_terminal_path() {
    let wf = Workflow::new(
        Arc::new(Hanging),
        FixedKnowledge::empty(),
        config(Duration::from_millis(50), 1),
    );
    let result = wf.process_request("hello?").await;

    assert_terminal(&result);
    assert!(result.answer.contains("timed out"), "{}", result.answer);
    let error = result.trace[0].output["error"].as_str().unwrap_or_default();
    assert!(error.starts_with("classify_request gave up after 2 attempt(s)"), "{error}");
}

#[tokio::test]
async fn transient_panic_is_retried() {
    let first = AtomicU32::new(0);
    let completion = Scripted::new(move |user, _| {
        if first.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("flaky");
        }
        Ok(if user.starts_with("Original Request") {
            r#"{"is_safe": true, "issues": []}"#.into()
        } else {
            "{}".into()
        })
    });
    let result = workflow(completion, FixedKnowledge::empty())
        .process_request("hi")
        .await;

    assert_full_trace(&result);
}

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let wf = Arc::new(workflow(Scripted::happy(), FixedKnowledge::password_reset()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let wf = Arc::clone(&wf);
            tokio::spawn(async move { wf.process_request(&format!("request {i}")).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.expect("task");
        assert_full_trace(&result);
        assert_eq!(result.trace[0].input["request_text"], format!("request {i}"));
    }
}
