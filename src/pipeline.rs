//! Search → generate → draft → label, one message at a time.
//!
//! Only the search call can abort a run. Every later step is attempted per
//! message and its result recorded as a [`MessageOutcome`], so one bad message
//! never stops the rest of the batch. A message is labeled only after its
//! draft was created; anything that fails earlier stays unlabeled and is picked
//! up again on the next run.

use crate::config::{Config, MissingKeyFallback};
use crate::draft;
use crate::generate::{Generator, Prompt};
use crate::models::MessageRef;
use crate::provider::{MailProvider, effective_query};
use anyhow::{Context, Result, bail};
use std::fmt;
use tracing::{error, info, warn};

/// Everything a run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub search_query: String,
    pub marker_label: String,
    pub max_results: u32,
    /// Enables AI drafting; `None` falls back to `missing_key_fallback`.
    pub api_key: Option<String>,
    pub persona: String,
    pub knowledge_base_text: String,
    pub missing_key_fallback: MissingKeyFallback,
    pub template_body: String,
    pub reply_prefix: String,
    pub fallback_recipient: Option<String>,
}

impl PipelineConfig {
    /// Rejects marker labels that cannot be expressed in a search exclusion:
    /// empty names and names containing a double quote.
    pub fn from_config(
        config: &Config,
        api_key: Option<String>,
        knowledge_base_text: String,
    ) -> Result<Self> {
        let marker_label = config.marker_label.trim();
        if marker_label.is_empty() {
            bail!("marker_label must not be empty");
        }
        if marker_label.contains('"') {
            bail!("marker_label {:?} must not contain double quotes", marker_label);
        }

        Ok(Self {
            search_query: config.search_query.clone(),
            marker_label: marker_label.to_string(),
            max_results: config.max_results.max(1),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            persona: config.persona.clone(),
            knowledge_base_text,
            missing_key_fallback: config.missing_key_fallback,
            template_body: config.template_body(),
            reply_prefix: config.reply_prefix.clone(),
            fallback_recipient: config.fallback_recipient.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Generate,
    Draft,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Generate => "generate",
            Stage::Draft => "draft",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Processed { draft_id: String, labeled: bool },
    Skipped { reason: String },
    Failed { stage: Stage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReport {
    pub message_id: String,
    pub outcome: MessageOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<MessageReport>,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}

enum ReplySource {
    Generated(Box<dyn Generator>),
    Template(String),
    Disabled,
}

pub struct Pipeline<P> {
    provider: P,
    config: PipelineConfig,
    source: ReplySource,
}

impl<P: MailProvider> Pipeline<P> {
    /// `generator` is only used when `config.api_key` is set. Without a key
    /// the configured fallback applies; this is reported here, once.
    pub fn new(
        provider: P,
        config: PipelineConfig,
        generator: Option<Box<dyn Generator>>,
    ) -> Self {
        let source = match generator {
            Some(generator) if config.api_key.is_some() => ReplySource::Generated(generator),
            _ => match config.missing_key_fallback {
                MissingKeyFallback::Template => {
                    warn!("No usable API key, AI drafting disabled; using template replies");
                    ReplySource::Template(config.template_body.clone())
                }
                MissingKeyFallback::Skip => {
                    warn!(
                        "No usable API key, AI drafting disabled; matching emails will be skipped"
                    );
                    ReplySource::Disabled
                }
            },
        };

        Self {
            provider,
            config,
            source,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let query = effective_query(&self.config.search_query, &self.config.marker_label);
        info!(query = %query, "Searching for emails");

        let found = self
            .provider
            .search_messages(&query, self.config.max_results)
            .await
            .context("Search failed")?;

        let mut summary = RunSummary::default();
        if found.is_empty() {
            info!("No emails found.");
            return Ok(summary);
        }
        info!(count = found.len(), "Found emails to process");

        for msg_ref in &found {
            let outcome = match self.source {
                ReplySource::Disabled => MessageOutcome::Skipped {
                    reason: "AI drafting disabled".to_string(),
                },
                _ => self.process(msg_ref).await,
            };
            match &outcome {
                MessageOutcome::Processed { draft_id, labeled } => {
                    info!(message_id = %msg_ref.id, draft_id = %draft_id, labeled, "Draft created")
                }
                MessageOutcome::Skipped { reason } => {
                    warn!(message_id = %msg_ref.id, reason = %reason, "Skipped email")
                }
                MessageOutcome::Failed { stage, reason } => {
                    error!(
                        message_id = %msg_ref.id,
                        stage = %stage,
                        reason = %reason,
                        "Failed to process email"
                    )
                }
            }
            summary.reports.push(MessageReport {
                message_id: msg_ref.id.clone(),
                outcome,
            });
        }

        Ok(summary)
    }

    async fn process(&self, msg_ref: &MessageRef) -> MessageOutcome {
        let mut message = match self.provider.get_message(&msg_ref.id).await {
            Ok(message) => message,
            Err(e) => return failed(Stage::Fetch, e),
        };
        if message.thread_id.is_empty() {
            message.thread_id = msg_ref.thread_id.clone();
        }
        info!(subject = message.subject.as_deref().unwrap_or(""), "Found email");

        let body = match &self.source {
            ReplySource::Generated(generator) => {
                let prompt = Prompt::new(
                    &self.config.persona,
                    &self.config.knowledge_base_text,
                    message.content(),
                );
                match generator.generate(&prompt).await {
                    Ok(text) => text,
                    Err(e) => return failed(Stage::Generate, e),
                }
            }
            ReplySource::Template(body) => body.clone(),
            ReplySource::Disabled => {
                return MessageOutcome::Skipped {
                    reason: "AI drafting disabled".to_string(),
                };
            }
        };

        let Some(reply) = draft::build_reply(
            &message,
            body,
            &self.config.reply_prefix,
            self.config.fallback_recipient.as_deref(),
        ) else {
            return MessageOutcome::Skipped {
                reason: "no recipient address".to_string(),
            };
        };

        let draft_id = match self.provider.create_draft(&reply).await {
            Ok(id) => id,
            Err(e) => return failed(Stage::Draft, e),
        };

        let labeled = match self
            .provider
            .tag_message(&message.id, &self.config.marker_label)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    error = %format!("{:#}", e),
                    "Failed to label email"
                );
                false
            }
        };

        MessageOutcome::Processed { draft_id, labeled }
    }
}

fn failed(stage: Stage, err: impl fmt::Display) -> MessageOutcome {
    MessageOutcome::Failed {
        stage,
        reason: format!("{:#}", err),
    }
}
