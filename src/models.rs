use serde::{Deserialize, Serialize};

/// Search hit as returned by `messages.list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub from_address: Option<String>,
    pub reply_to: Option<String>,
    /// RFC 822 `Message-ID` header, used to thread the reply.
    pub message_id_header: Option<String>,
    pub references: Option<String>,
    pub body_plain: Option<String>,
}

impl Message {
    /// Text handed to the generator: the snippet, or the plain body when the
    /// snippet is empty.
    pub fn content(&self) -> &str {
        match self.snippet.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => self.body_plain.as_deref().map(str::trim).unwrap_or(""),
        }
    }

    /// Address a reply should go to.
    pub fn reply_address(&self) -> Option<&str> {
        self.reply_to
            .as_deref()
            .or(self.from_address.as_deref())
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub thread_id: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_prefers_snippet() {
        let msg = Message {
            snippet: Some("What is scarcity?".to_string()),
            body_plain: Some("Full body".to_string()),
            ..Default::default()
        };
        assert_eq!(msg.content(), "What is scarcity?");
    }

    #[test]
    fn test_content_falls_back_to_body() {
        let msg = Message {
            snippet: Some("   ".to_string()),
            body_plain: Some("Full body\n".to_string()),
            ..Default::default()
        };
        assert_eq!(msg.content(), "Full body");
    }

    #[test]
    fn test_reply_address_prefers_reply_to() {
        let msg = Message {
            from_address: Some("a@example.com".to_string()),
            reply_to: Some("b@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(msg.reply_address(), Some("b@example.com"));

        let msg = Message {
            from_address: Some("a@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(msg.reply_address(), Some("a@example.com"));
        assert_eq!(Message::default().reply_address(), None);
    }
}
