//! System prompts for the completion-backed stages.

use supportpilot_shared::PromptsConfig;

const CLASSIFIER_PROMPT: &str = r#"You are a support request classifier. Read the customer's message and label it on three axes.

Intent, the kind of request:
- "technical_issue": software or hardware not working as expected
- "billing_inquiry": payments, subscriptions, refunds
- "general_question": general information requests
- "feature_request": suggestions for new functionality
- "complaint": dissatisfaction with the product or service
- "account_issue": login, access, or account settings

Sentiment, the emotional tone: "positive", "neutral", or "negative".

Urgency, how soon it needs attention:
- "high": blocking or critical
- "medium": important, not blocking
- "low": can wait for a standard response

Reply with a single JSON object with the keys "intent", "sentiment" and "urgency"."#;

const WRITER_PROMPT: &str = "You are a customer support agent. Write a professional, empathetic reply grounded in the knowledge sources you are given. Keep it concise and actionable, and match the customer's intent and urgency.";

const GUARD_PROMPT: &str = r#"You review customer support replies before they are sent. Check the reply for:
- safety problems: harmful content, inappropriate language, exposed personal data, security risks
- hallucinations: claims the knowledge sources do not support, invented facts, contradictions
- policy problems: promises that cannot be kept, financial or legal commitments
- quality problems: missing information, unclear wording

Reply with a single JSON object:
{"is_safe": <bool>, "issues": [<string>, ...], "confidence": <number between 0 and 1>}
Use an empty issues list when the reply is safe."#;

/// The three system prompts, with config overrides applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub classifier: String,
    pub writer: String,
    pub guard: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            classifier: CLASSIFIER_PROMPT.to_string(),
            writer: WRITER_PROMPT.to_string(),
            guard: GUARD_PROMPT.to_string(),
        }
    }
}

impl From<&PromptsConfig> for PromptSet {
    fn from(config: &PromptsConfig) -> Self {
        let defaults = Self::default();
        let pick = |custom: &Option<String>, default: String| match custom {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => default,
        };
        Self {
            classifier: pick(&config.classifier, defaults.classifier),
            writer: pick(&config.writer, defaults.writer),
            guard: pick(&config.guard, defaults.guard),
        }
    }
}
