//! Core domain types shared by the pipeline, the knowledge store, and the CLI.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Classification labels
// ---------------------------------------------------------------------------

/// What kind of support request this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    TechnicalIssue,
    BillingInquiry,
    #[default]
    GeneralQuestion,
    FeatureRequest,
    Complaint,
    AccountIssue,
}

impl Intent {
    /// Every intent, in declaration order.
    pub const ALL: [Intent; 6] = [
        Self::TechnicalIssue,
        Self::BillingInquiry,
        Self::GeneralQuestion,
        Self::FeatureRequest,
        Self::Complaint,
        Self::AccountIssue,
    ];

    /// Wire label (e.g. `billing_inquiry`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TechnicalIssue => "technical_issue",
            Self::BillingInquiry => "billing_inquiry",
            Self::GeneralQuestion => "general_question",
            Self::FeatureRequest => "feature_request",
            Self::Complaint => "complaint",
            Self::AccountIssue => "account_issue",
        }
    }

    /// Parse a wire label. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|i| i.as_str() == label)
    }
}

/// Emotional tone of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }
}

/// How quickly the request needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    #[default]
    Medium,
    Low,
}

impl Urgency {
    pub const ALL: [Urgency; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|u| u.as_str() == label)
    }
}

macro_rules! impl_label_display {
    ($($ty:ty),*) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

impl_label_display!(Intent, Sentiment, Urgency);

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A knowledge article retrieved for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Cosine similarity to the request, in `[0, 1]`.
    pub similarity_score: f64,
}

/// One row returned by a knowledge store search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Backends may omit the score.
    #[serde(default)]
    pub similarity: Option<f64>,
}

impl From<SearchHit> for Source {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            title: hit.title,
            content: hit.content,
            similarity_score: hit.similarity.unwrap_or(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Trace & metrics
// ---------------------------------------------------------------------------

/// Audit-trail entry for one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub agent_name: String,
    pub step_name: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub duration_ms: u64,
    /// RFC 3339 timestamp of when the record was written.
    pub timestamp: String,
}

impl StepRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        agent_name: impl Into<String>,
        step_name: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
        duration: Duration,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            step_name: step_name.into(),
            input,
            output,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Whether the stage recorded a collaborator failure.
    pub fn is_error(&self) -> bool {
        self.output.get("error").is_some()
    }
}

/// Latency and estimated token usage for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub latency_ms: u64,
    pub token_usage: u64,
}

/// What a caller gets back from the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub answer: String,
    pub sources: Vec<Source>,
    pub trace: Vec<StepRecord>,
    pub metrics: Metrics,
}

// ---------------------------------------------------------------------------
// Knowledge documents
// ---------------------------------------------------------------------------

/// A support article as stored in the local knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Unique document identifier (UUID v7).
    pub id: String,
    pub title: String,
    pub content: String,
    /// SHA-256 hash of the content, used for de-duplication.
    pub content_hash: String,
    /// Embedding vector; empty when not yet computed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A title/content pair to be added to a knowledge store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_roundtrip_through_serde() {
        for intent in Intent::ALL {
            let json = serde_json::to_string(&intent).expect("serialize");
            assert_eq!(json, format!("\"{}\"", intent.as_str()));
            let parsed: Intent = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(parsed, intent);
        }
    }

    #[test]
    fn from_label_is_lenient_about_case_and_whitespace() {
        assert_eq!(Intent::from_label(" Billing_Inquiry "), Some(Intent::BillingInquiry));
        assert_eq!(Sentiment::from_label("NEGATIVE"), Some(Sentiment::Negative));
        assert_eq!(Urgency::from_label("urgent"), None);
    }

    #[test]
    fn defaults_are_the_fallback_triple() {
        assert_eq!(Intent::default(), Intent::GeneralQuestion);
        assert_eq!(Sentiment::default(), Sentiment::Neutral);
        assert_eq!(Urgency::default(), Urgency::Medium);
    }

    #[test]
    fn search_hit_without_similarity_scores_zero() {
        let hit: SearchHit =
            serde_json::from_str(r#"{"id":"1","title":"T","content":"C"}"#).expect("parse");
        let source = Source::from(hit);
        assert_eq!(source.similarity_score, 0.0);
    }

    #[test]
    fn step_record_error_detection() {
        let ok = StepRecord::new(
            "RetrieverAgent",
            "retrieve_knowledge",
            serde_json::json!({}),
            serde_json::json!({"sources_found": 0}),
            Duration::from_millis(3),
        );
        assert!(!ok.is_error());
        assert_eq!(ok.duration_ms, 3);

        let failed = StepRecord {
            output: serde_json::json!({"error": "boom"}),
            ..ok
        };
        assert!(failed.is_error());
    }

    #[test]
    fn process_result_serialization() {
        let result = ProcessResult {
            answer: "Try resetting your password.".into(),
            sources: vec![Source {
                id: "doc-1".into(),
                title: "Password Reset".into(),
                content: "Click 'Forgot Password'.".into(),
                similarity_score: 0.85,
            }],
            trace: vec![],
            metrics: Metrics {
                latency_ms: 12,
                token_usage: 100,
            },
        };

        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["sources"][0]["similarity_score"], 0.85);
        assert_eq!(json["metrics"]["token_usage"], 100);
        let parsed: ProcessResult = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, result);
    }
}
