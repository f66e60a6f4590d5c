//! context.rs — the immutable unit of evaluation.
//!
//! A `SubmissionContext` is built once per inbound item (comment or form
//! entry) and handed to the decision engine by reference; nothing in the
//! pipeline mutates it.

use serde::{Deserialize, Serialize};

/// What kind of submission is being evaluated. Affects analytics labels,
/// not the pipeline itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Comment,
    ContactForm,
    CustomForm,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Comment => "comment",
            EntryKind::ContactForm => "contact_form",
            EntryKind::CustomForm => "custom_form",
        }
    }
}

/// One submission as seen by the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionContext {
    /// Free-text body of the comment / message field.
    pub content: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default)]
    pub author_url: String,
    /// Already-resolved client IP (proxy unwrapping is the caller's job).
    pub source_ip: String,
    #[serde(default)]
    pub user_agent: String,
    /// Unix seconds at which the form was rendered. `None` (field stripped
    /// by the bot) is treated as suspicious by the timing check.
    #[serde(default)]
    pub form_loaded_at: Option<u64>,
    /// Unix seconds at which the submission arrived.
    pub submitted_at: u64,
    pub entry_kind: EntryKind,
    /// Value of the hidden decoy field. Humans never see it; any content
    /// here is authoritative bot evidence.
    #[serde(default)]
    pub honeypot: String,
}

impl SubmissionContext {
    /// Seconds the submitter spent on the form, if the load timestamp was
    /// present and sane.
    pub fn fill_time_secs(&self) -> Option<u64> {
        self.form_loaded_at
            .map(|loaded| self.submitted_at.saturating_sub(loaded))
    }

    /// First 100 chars of content, used for analytics rows and pattern
    /// previews (matches the stored preview length).
    pub fn content_preview(&self) -> String {
        self.content.chars().take(100).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_time_handles_missing_and_backwards_timestamps() {
        let mut ctx = SubmissionContext {
            content: "hi".into(),
            author_name: String::new(),
            author_email: String::new(),
            author_url: String::new(),
            source_ip: "1.2.3.4".into(),
            user_agent: String::new(),
            form_loaded_at: None,
            submitted_at: 1_700_000_100,
            entry_kind: EntryKind::Comment,
            honeypot: String::new(),
        };
        assert_eq!(ctx.fill_time_secs(), None);

        ctx.form_loaded_at = Some(1_700_000_090);
        assert_eq!(ctx.fill_time_secs(), Some(10));

        // Clock skew: load timestamp in the future must not underflow.
        ctx.form_loaded_at = Some(1_700_000_200);
        assert_eq!(ctx.fill_time_secs(), Some(0));
    }
}
