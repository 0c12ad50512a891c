use crate::models::{Draft, Message};
use base64::{Engine as _, engine::general_purpose};

/// Prefixes `prefix` to the subject unless it already starts with it.
/// Leading whitespace and case are ignored when checking, so applying this
/// twice gives the same result as applying it once.
pub fn reply_subject(subject: &str, prefix: &str) -> String {
    let subject = subject.trim();
    let prefix = prefix.trim();

    let already = subject
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix));

    if already || prefix.is_empty() {
        subject.to_string()
    } else if subject.is_empty() {
        prefix.to_string()
    } else {
        format!("{} {}", prefix, subject)
    }
}

/// Builds a reply draft for `message`. Returns `None` when there is nobody to
/// reply to.
pub fn build_reply(
    message: &Message,
    body: String,
    prefix: &str,
    fallback_recipient: Option<&str>,
) -> Option<Draft> {
    let to = message
        .reply_address()
        .or(fallback_recipient.filter(|r| !r.trim().is_empty()))?
        .to_string();

    let references = match (&message.references, &message.message_id_header) {
        (Some(refs), Some(id)) => Some(format!("{} {}", refs.trim(), id)),
        (None, Some(id)) => Some(id.clone()),
        (refs, None) => refs.clone(),
    };

    Some(Draft {
        to,
        subject: reply_subject(message.subject.as_deref().unwrap_or(""), prefix),
        body,
        thread_id: message.thread_id.clone(),
        in_reply_to: message.message_id_header.clone(),
        references,
    })
}

impl Draft {
    /// Renders the draft as an RFC 822 message for upload.
    pub fn to_rfc822(&self) -> String {
        let mut raw = format!(
            "To: {}\r\nSubject: {}\r\n",
            strip_newlines(&self.to),
            encode_header(&self.subject)
        );
        if let Some(id) = &self.in_reply_to {
            raw.push_str(&format!("In-Reply-To: {}\r\n", strip_newlines(id)));
        }
        if let Some(refs) = &self.references {
            raw.push_str(&format!("References: {}\r\n", strip_newlines(refs)));
        }
        raw.push_str("MIME-Version: 1.0\r\n");
        raw.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n");
        raw.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
        raw.push_str(&self.body.replace("\r\n", "\n").replace('\n', "\r\n"));
        raw
    }
}

fn strip_newlines(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

// RFC 2047 encoded-word for non-ASCII header values.
fn encode_header(value: &str) -> String {
    let value = strip_newlines(value);
    if value.is_ascii() {
        value
    } else {
        format!("=?UTF-8?B?{}?=", general_purpose::STANDARD.encode(value.as_bytes()))
    }
}
