use crate::models;
use crate::provider::MailProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::api::{MessagePart, ModifyMessageRequest, Scope};
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use std::io::Cursor;
use tracing::debug;

pub type GmailHub = Gmail<HttpsConnector<HttpConnector>>;

const USER: &str = "me";
// Largest page `messages.list` accepts.
const MAX_PAGE_SIZE: u32 = 500;

#[derive(Clone)]
pub struct GmailClient {
    hub: GmailHub,
}

impl GmailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }

    async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<(Vec<models::MessageRef>, Option<String>)> {
        let mut req = self
            .hub
            .users()
            .messages_list(USER)
            .q(query)
            .max_results(max_results)
            .add_scope(Scope::Modify);

        if let Some(token) = page_token {
            req = req.page_token(token);
        }

        let (_, message_list) = req.doit().await.context("Failed to search messages")?;

        let refs = message_list
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                Some(models::MessageRef {
                    id: m.id?,
                    thread_id: m.thread_id.unwrap_or_default(),
                })
            })
            .collect();

        Ok((refs, message_list.next_page_token))
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn search_messages(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<models::MessageRef>> {
        debug!(query, max_results, "Searching messages");
        let limit = max_results as usize;
        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;

        // `max_results` caps the whole search, across pages.
        while refs.len() < limit {
            let page_size = ((limit - refs.len()) as u32).min(MAX_PAGE_SIZE);
            let (page, next) = self
                .list_messages(query, page_size, page_token.as_deref())
                .await?;
            if page.is_empty() {
                break;
            }
            refs.extend(page);

            match next {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        refs.truncate(limit);
        Ok(refs)
    }

    async fn get_message(&self, id: &str) -> Result<models::Message> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get(USER, id)
            .format("full")
            .add_scope(Scope::Modify)
            .doit()
            .await
            .with_context(|| format!("Failed to get message {}", id))?;

        let mut message = models::Message {
            id: msg.id.unwrap_or_else(|| id.to_string()),
            thread_id: msg.thread_id.unwrap_or_default(),
            snippet: msg.snippet,
            ..Default::default()
        };

        if let Some(payload) = &msg.payload {
            for header in payload.headers.iter().flatten() {
                let (Some(name), Some(value)) = (header.name.as_deref(), header.value.clone())
                else {
                    continue;
                };
                match name.to_ascii_lowercase().as_str() {
                    "subject" => message.subject = Some(value),
                    "from" => message.from_address = Some(value),
                    "reply-to" => message.reply_to = Some(value),
                    "message-id" => message.message_id_header = Some(value),
                    "references" => message.references = Some(value),
                    _ => {}
                }
            }
            message.body_plain = extract_text_body(payload);
        }

        Ok(message)
    }

    async fn create_draft(&self, draft: &models::Draft) -> Result<String> {
        let metadata = google_gmail1::api::Draft {
            message: Some(google_gmail1::api::Message {
                thread_id: Some(draft.thread_id.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let raw = draft.to_rfc822();
        debug!(thread_id = %draft.thread_id, bytes = raw.len(), "Creating draft");

        let (_, created) = self
            .hub
            .users()
            .drafts_create(metadata, USER)
            .add_scope(Scope::Modify)
            .upload(Cursor::new(raw.into_bytes()), "message/rfc822".parse()?)
            .await
            .context("Failed to create draft")?;

        Ok(created.id.unwrap_or_default())
    }

    async fn list_labels(&self) -> Result<Vec<models::Label>> {
        let (_, label_list) = self
            .hub
            .users()
            .labels_list(USER)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .context("Failed to list labels")?;

        let labels = label_list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| models::Label {
                id: l.id.unwrap_or_default(),
                name: l.name.unwrap_or_default(),
            })
            .collect();

        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<models::Label> {
        let request = google_gmail1::api::Label {
            name: Some(name.to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            message_list_visibility: Some("show".to_string()),
            ..Default::default()
        };

        let (_, label) = self
            .hub
            .users()
            .labels_create(request, USER)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .with_context(|| format!("Failed to create label {}", name))?;

        Ok(models::Label {
            id: label.id.context("Created label has no id")?,
            name: label.name.unwrap_or_else(|| name.to_string()),
        })
    }

    async fn add_label(&self, message_id: &str, label_id: &str) -> Result<()> {
        let req = ModifyMessageRequest {
            add_label_ids: Some(vec![label_id.to_string()]),
            remove_label_ids: None,
        };
        self.hub
            .users()
            .messages_modify(req, USER, message_id)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .with_context(|| format!("Failed to label message {}", message_id))?;
        Ok(())
    }
}

/// Concatenates every `text/plain` part of the payload.
fn extract_text_body(part: &MessagePart) -> Option<String> {
    if part.mime_type.as_deref() == Some("text/plain") {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
            return Some(decode_body(data));
        }
    }

    let body: String = part
        .parts
        .iter()
        .flatten()
        .filter_map(extract_text_body)
        .collect();

    (!body.is_empty()).then_some(body)
}

// The API client normally hands back decoded bytes; some responses still
// carry base64url text, so try that first.
fn decode_body(data: &[u8]) -> String {
    use base64::{Engine as _, engine::general_purpose};

    let text = String::from_utf8_lossy(data);
    let trimmed = text.trim();
    general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed.trim_end_matches('='))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::effective_query;
    use google_gmail1::api::MessagePartBody;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GmailClient {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let mut hub = Gmail::new(
            hyper::Client::builder().build(connector),
            "test-token".to_string(),
        );
        hub.base_url(format!("{}/", server.uri()));
        hub.root_url(format!("{}/", server.uri()));
        GmailClient::new(hub)
    }

    #[tokio::test]
    async fn test_search_sends_query_and_follows_pages() {
        let server = MockServer::start().await;
        let query = effective_query("subject:BrickIntel", "AI_PROCESSED");

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "(subject:BrickIntel) -label:AI_PROCESSED"))
            .and(query_param("maxResults", "10"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "m1", "threadId": "t1"}],
                "nextPageToken": "p2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "(subject:BrickIntel) -label:AI_PROCESSED"))
            .and(query_param("maxResults", "9"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "m2", "threadId": "t2"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let refs = client(&server).search_messages(&query, 10).await.unwrap();

        assert_eq!(
            refs,
            vec![
                models::MessageRef {
                    id: "m1".to_string(),
                    thread_id: "t1".to_string()
                },
                models::MessageRef {
                    id: "m2".to_string(),
                    thread_id: "t2".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_search_stops_at_max_results() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "m1", "threadId": "t1"}],
                "nextPageToken": "p2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let refs = client(&server).search_messages("-label:X", 1).await.unwrap();
        assert_eq!(refs.len(), 1);
    }

    #[tokio::test]
    async fn test_search_empty_and_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "-label:EMPTY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultSizeEstimate": 0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "-label:BROKEN"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"code": 500, "message": "backend error"}
            })))
            .mount(&server)
            .await;

        let gmail = client(&server);
        assert!(gmail.search_messages("-label:EMPTY", 10).await.unwrap().is_empty());
        assert!(gmail.search_messages("-label:BROKEN", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_create_draft_uploads_message_in_thread() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/gmail/v1/users/me/drafts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "d1",
                "message": {"id": "x1", "threadId": "t1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let draft = models::Draft {
            to: "ann@example.com".to_string(),
            subject: "Re: BrickIntel question".to_string(),
            body: "Scarcity means limited supply.".to_string(),
            thread_id: "t1".to_string(),
            in_reply_to: Some("<abc@mail.example.com>".to_string()),
            references: None,
        };

        let id = client(&server).create_draft(&draft).await.unwrap();
        assert_eq!(id, "d1");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("\"threadId\":\"t1\""), "metadata missing: {body}");
        assert!(body.contains("message/rfc822"));
        assert!(body.contains("Subject: Re: BrickIntel question"));
        assert!(body.contains("In-Reply-To: <abc@mail.example.com>"));
        assert!(body.contains("Scarcity means limited supply."));
    }

    #[tokio::test]
    async fn test_tag_message_creates_missing_label_and_applies_it() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "labels": [{"id": "INBOX", "name": "INBOX", "type": "system"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/labels"))
            .and(body_partial_json(json!({"name": "AI_PROCESSED"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "Label_1",
                "name": "AI_PROCESSED"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_partial_json(json!({"addLabelIds": ["Label_1"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "m1",
                "threadId": "t1",
                "labelIds": ["INBOX", "Label_1"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let label = client(&server)
            .tag_message("m1", "AI_PROCESSED")
            .await
            .unwrap();

        assert_eq!(
            label,
            models::Label {
                id: "Label_1".to_string(),
                name: "AI_PROCESSED".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_tag_message_reuses_existing_label() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "labels": [{"id": "Label_7", "name": "AI_PROCESSED", "type": "user"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m2/modify"))
            .and(body_partial_json(json!({"addLabelIds": ["Label_7"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m2"})))
            .expect(1)
            .mount(&server)
            .await;

        let label = client(&server)
            .tag_message("m2", "AI_PROCESSED")
            .await
            .unwrap();
        assert_eq!(label.id, "Label_7");
    }

    fn part(mime: &str, data: Option<&str>, parts: Option<Vec<MessagePart>>) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: data.map(|d| MessagePartBody {
                data: Some(d.as_bytes().to_vec()),
                ..Default::default()
            }),
            parts,
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_plain_body_from_multipart() {
        let payload = part(
            "multipart/alternative",
            None,
            Some(vec![
                part("text/plain", Some("Hello there, what is scarcity?"), None),
                part("text/html", Some("<p>Hello</p>"), None),
            ]),
        );
        assert_eq!(
            extract_text_body(&payload).as_deref(),
            Some("Hello there, what is scarcity?")
        );
    }

    #[test]
    fn test_extract_body_decodes_base64url() {
        // "Hi!" base64url encoded
        let payload = part("text/plain", Some("SGkh"), None);
        assert_eq!(extract_text_body(&payload).as_deref(), Some("Hi!"));
    }

    #[test]
    fn test_extract_body_none_without_plain_part() {
        let payload = part("text/html", Some("<p>x</p>"), None);
        assert!(extract_text_body(&payload).is_none());
    }
}
