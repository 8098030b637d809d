//! Sample support articles and the seed/clean operations.

use serde::Serialize;
use supportpilot_shared::{NewDocument, Result};
use tracing::info;

use crate::KnowledgeStore;

/// Outcome of a [`seed`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Articles written.
    pub inserted: usize,
    /// Articles skipped as duplicates.
    pub duplicates: usize,
    /// Articles already in the store when seeding was skipped.
    pub existing: u64,
    /// Whether seeding was skipped because the store was not empty.
    pub skipped: bool,
}

/// Seed `store` with [`sample_articles`]. A non-empty store is left alone
/// unless `force` is set; forced runs still skip duplicate content.
pub async fn seed(store: &dyn KnowledgeStore, force: bool) -> Result<SeedReport> {
    let existing = store.count().await?;
    if existing > 0 && !force {
        info!(existing, backend = store.name(), "knowledge base not empty, skipping seed");
        return Ok(SeedReport {
            existing,
            skipped: true,
            ..SeedReport::default()
        });
    }

    let ids = store.add_documents(sample_articles()).await?;
    let inserted = ids.iter().filter(|id| id.is_some()).count();
    let report = SeedReport {
        inserted,
        duplicates: ids.len() - inserted,
        existing,
        skipped: false,
    };

    info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        backend = store.name(),
        "seeded knowledge base"
    );
    Ok(report)
}

/// Remove every article from `store`.
pub async fn clean(store: &dyn KnowledgeStore) -> Result<u64> {
    let removed = store.clear().await?;
    info!(removed, backend = store.name(), "cleaned knowledge base");
    Ok(removed)
}

/// The ten built-in support articles.
pub fn sample_articles() -> Vec<NewDocument> {
    SAMPLE_ARTICLES
        .iter()
        .map(|(title, content)| NewDocument::new(*title, *content))
        .collect()
}

const SAMPLE_ARTICLES: [(&str, &str); 10] = [
    (
        "How to Reset Your Password",
        "To reset your password, click the 'Forgot Password' link on the login page. Enter your email address and check your inbox for a password reset link. Click the link and create a new password. Make sure your new password is at least 8 characters long and includes a mix of letters, numbers, and symbols. If you don't receive the email within 5 minutes, check your spam folder.",
    ),
    (
        "Troubleshooting Login Issues",
        "If you're having trouble logging in, first verify you're using the correct email and password. Ensure Caps Lock is off and check for typos. Clear your browser cache and cookies, then try again. If using a password manager, ensure it's autofilling the correct credentials. For persistent issues, try resetting your password or contact support if you continue to experience problems.",
    ),
    (
        "Setting Up Two-Factor Authentication",
        "Two-factor authentication adds an extra layer of security to your account. Go to Settings > Security > Two-Factor Authentication. Choose your preferred method: SMS text messages or authenticator app. For SMS, enter your phone number and verify it with the code sent. For authenticator apps, scan the QR code with apps like Google Authenticator or Authy, then enter the 6-digit code to complete setup.",
    ),
    (
        "Managing Account Notifications",
        "Customize your notification preferences in Settings > Notifications. You can choose to receive emails for account activity, security alerts, product updates, and marketing communications. Toggle each category on or off based on your preferences. You can also set the frequency of digest emails (immediate, daily, or weekly). Changes take effect immediately, and you can update preferences anytime.",
    ),
    (
        "Understanding Your Billing Statement",
        "Your billing statement shows all charges and credits for the billing period. It includes your subscription fee, any add-on services, taxes, and payments received. You can access statements from Billing > Payment History > View Statements. Each statement shows the billing period, due date, and itemized charges. Download statements as PDFs for your records. Contact billing support if you have questions about specific charges.",
    ),
    (
        "How to Cancel Your Subscription",
        "To cancel your subscription, go to Settings > Subscription > Cancel Subscription. You'll be asked to provide a reason for cancellation (optional but helpful). Your access continues until the end of your current billing period. You can reactivate anytime before the cancellation takes effect. After cancellation, export your data as it will be permanently deleted after 30 days. Refunds are prorated based on your remaining subscription time.",
    ),
    (
        "Data Privacy and Security Settings",
        "Protect your privacy with comprehensive security settings. Enable two-factor authentication, review connected apps and remove unauthorized access, and set up login alerts. Control data sharing preferences in Privacy Settings. You can request a copy of your data or delete your account entirely. We use industry-standard encryption and comply with GDPR, CCPA, and other privacy regulations. Review our privacy policy for detailed information.",
    ),
    (
        "Troubleshooting Mobile App Issues",
        "For mobile app problems, first ensure you have the latest version installed. Force close and restart the app, then check your internet connection. Clear the app cache from your device settings. If issues persist, try uninstalling and reinstalling the app (your data is saved in the cloud). For iOS users, check if the app has necessary permissions in Settings. Android users should clear the app cache and data from Application Settings.",
    ),
    (
        "API Integration and Webhooks",
        "Integrate with our API to automate workflows. Generate API keys from Developer Settings > API Keys. Use our RESTful endpoints for CRUD operations, and set up webhooks to receive real-time notifications for events like new signups or payments. Rate limits apply: 1000 requests per hour for standard plans. Review API documentation for authentication methods, endpoint specifications, and code examples in multiple programming languages.",
    ),
    (
        "Exporting and Importing Data",
        "Export your data from Settings > Data Management > Export. Choose export format (CSV, JSON, or XML) and select data types to include. Large exports are processed asynchronously and emailed when ready. To import data, use the same section and upload files in supported formats. Validate data format before importing to avoid errors. Import history shows status and any error details. Contact support for assistance with large data migrations.",
    ),
];
