use crate::models::{Draft, Label, Message, MessageRef};
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Builds the query actually sent to the mail provider: the caller's query
/// with an exclusion of the marker label appended.
pub fn effective_query(query: &str, marker_label: &str) -> String {
    let exclusion = format!("-label:{}", quote_label(marker_label));
    let query = query.trim();
    if query.is_empty() {
        exclusion
    } else {
        format!("({}) {}", query, exclusion)
    }
}

// Names containing `"` never get here; the pipeline config rejects them.
fn quote_label(name: &str) -> String {
    if name.chars().any(|c| c.is_whitespace() || c == '(' || c == ')') {
        format!("\"{}\"", name)
    } else {
        name.to_string()
    }
}

/// The mail operations the pipeline depends on.
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn search_messages(&self, query: &str, max_results: u32) -> Result<Vec<MessageRef>>;

    async fn get_message(&self, id: &str) -> Result<Message>;

    /// Creates the draft and returns its id.
    async fn create_draft(&self, draft: &Draft) -> Result<String>;

    async fn list_labels(&self) -> Result<Vec<Label>>;

    async fn create_label(&self, name: &str) -> Result<Label>;

    async fn add_label(&self, message_id: &str, label_id: &str) -> Result<()>;

    /// Ensures a label named exactly `label_name` exists, then applies it to
    /// the message.
    ///
    /// Lookup, creation and application are separate calls. A failure after
    /// creation leaves an unused label behind, and two overlapping runs can
    /// both create a label with the same name. Both are limitations of the
    /// provider API, not errors.
    async fn tag_message(&self, message_id: &str, label_name: &str) -> Result<Label> {
        let existing = self
            .list_labels()
            .await?
            .into_iter()
            .find(|l| l.name == label_name);

        let label = match existing {
            Some(label) => label,
            None => {
                let label = self.create_label(label_name).await?;
                info!(label = %label.name, id = %label.id, "Created label");
                label
            }
        };

        self.add_label(message_id, &label.id).await?;
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_query_appends_exclusion() {
        let q = "subject:BrickIntel OR \"Investment Tool\"";
        let effective = effective_query(q, "AI_PROCESSED");
        assert_eq!(
            effective,
            "(subject:BrickIntel OR \"Investment Tool\") -label:AI_PROCESSED"
        );
        assert!(effective.contains(q));
        assert!(effective.contains("-label:AI_PROCESSED"));
    }

    #[test]
    fn test_effective_query_blank_query() {
        assert_eq!(effective_query("  ", "DONE"), "-label:DONE");
    }

    #[test]
    fn test_effective_query_quotes_label_with_spaces() {
        assert_eq!(
            effective_query("is:unread", "AI processed"),
            "(is:unread) -label:\"AI processed\""
        );
    }
}
