//! Built-in demo knowledge base used when no real store is configured.

use async_trait::async_trait;
use supportpilot_shared::{NewDocument, Result, SearchHit, SupportPilotError};

use crate::KnowledgeStore;

/// `(id, title, content, similarity)` of every demo article.
const DEMO_ARTICLES: [(&str, &str, &str, f64); 2] = [
    (
        "demo-1",
        "Password Reset Guide",
        "To reset your password, click the 'Forgot Password' link on the login page. Enter your email address and check your inbox for a reset link. The link expires after 24 hours. If you don't receive the email, check your spam folder or contact support.",
        0.85,
    ),
    (
        "demo-2",
        "Billing and Subscription",
        "Our subscription plans are billed monthly or annually. You can change your plan at any time from your account settings. Refunds are available within 30 days of purchase for monthly plans and 14 days for annual plans. Contact billing@support.com for refund requests.",
        0.75,
    ),
];

/// Read-only store returning the demo articles with fixed scores,
/// regardless of the query text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoKnowledgeBase;

fn read_only() -> SupportPilotError {
    SupportPilotError::Knowledge("the demo knowledge base is read-only".into())
}

#[async_trait]
impl KnowledgeStore for DemoKnowledgeBase {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn search(&self, _query: &str, limit: usize, threshold: f64) -> Result<Vec<SearchHit>> {
        Ok(DEMO_ARTICLES
            .iter()
            .filter(|(_, _, _, similarity)| *similarity > threshold)
            .take(limit)
            .map(|(id, title, content, similarity)| SearchHit {
                id: (*id).into(),
                title: (*title).into(),
                content: (*content).into(),
                similarity: Some(*similarity),
            })
            .collect())
    }

    async fn add_document(&self, _doc: NewDocument) -> Result<Option<String>> {
        Err(read_only())
    }

    async fn count(&self) -> Result<u64> {
        Ok(DEMO_ARTICLES.len() as u64)
    }

    async fn clear(&self) -> Result<u64> {
        Err(read_only())
    }

    async fn list(&self) -> Result<Vec<SearchHit>> {
        Ok(DEMO_ARTICLES
            .iter()
            .map(|(id, title, content, _)| SearchHit {
                id: (*id).into(),
                title: (*title).into(),
                content: (*content).into(),
                similarity: None,
            })
            .collect())
    }
}
