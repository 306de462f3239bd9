// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Turning one Slack event into one streamed reply
//!
//! The handler gates the event, gathers the conversation it belongs to,
//! posts the in-progress message and hands the turn to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::chat::formatting::format_message_for_model;
use crate::chat::{
    ConversationOrchestrator, IncrementalRenderer, Redactor, RenderOptions, RenderTarget,
    TurnOutcome,
};
use crate::config::Settings;
use crate::error::Result;
use crate::llm::{ContentPart, Message, Role};

use super::events::{EventGate, GateDecision, IncomingMessage};
use super::files::attachment_parts;
use super::{MessagingSurface, SurfaceMessage};

/// Posted instead of a reply when no completion API key is configured
pub const MISSING_API_KEY_TEXT: &str =
    "To use this app, please configure your OpenAI API key first";

/// How the handler builds context and replies
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub system_prompt: String,
    pub translate_markdown: bool,
    pub loading_text: String,
    pub dm_history_limit: usize,
    pub dm_max_age: Duration,
    pub thread_reply_limit: usize,
    pub files_enabled: bool,
    pub max_file_size: u64,
    pub render: RenderOptions,
}

impl HandlerOptions {
    pub fn from_settings(settings: &Settings, bot_user_id: &str) -> Self {
        Self {
            system_prompt: settings.system_prompt(bot_user_id),
            translate_markdown: settings.conversation.translate_markdown,
            loading_text: settings.streaming.loading_text.clone(),
            dm_history_limit: settings.history.dm_history_limit,
            dm_max_age: Duration::from_secs(settings.history.dm_max_age_secs),
            thread_reply_limit: settings.history.thread_reply_limit,
            files_enabled: settings.files.enabled,
            max_file_size: settings.files.max_file_size,
            render: RenderOptions {
                max_chunk_length: settings.streaming.max_chunk_length,
                loading_suffix: settings.streaming.loading_suffix.clone(),
                translate_markdown: settings.conversation.translate_markdown,
            },
        }
    }
}

/// What the handler did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Skipped(&'static str),
    /// The API key notice was posted
    MissingApiKey,
    /// Nothing to reply to
    NoContext,
    Replied(TurnOutcome),
}

/// Handles incoming message events
pub struct MessageHandler {
    surface: Arc<dyn MessagingSurface>,
    orchestrator: Option<Arc<ConversationOrchestrator>>,
    gate: EventGate,
    redactor: Option<Redactor>,
    options: HandlerOptions,
}

impl MessageHandler {
    /// `orchestrator` is `None` when no API key is configured.
    pub fn new(
        surface: Arc<dyn MessagingSurface>,
        orchestrator: Option<Arc<ConversationOrchestrator>>,
        gate: EventGate,
        redactor: Option<Redactor>,
        options: HandlerOptions,
    ) -> Self {
        Self {
            surface,
            orchestrator,
            gate,
            redactor,
            options,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        surface: Arc<dyn MessagingSurface>,
        orchestrator: Option<Arc<ConversationOrchestrator>>,
        bot_user_id: &str,
    ) -> Result<Self> {
        Ok(Self::new(
            surface,
            orchestrator,
            EventGate::new(bot_user_id, settings.slack.bot_id.clone()),
            Redactor::from_config(&settings.redaction)?,
            HandlerOptions::from_settings(settings, bot_user_id),
        ))
    }

    pub async fn handle(&self, event: &IncomingMessage) -> Result<HandleOutcome> {
        if let GateDecision::Skip(reason) = self.gate.evaluate(self.surface.as_ref(), event).await? {
            tracing::debug!(target: "slaick.slack", ts = %event.ts, reason, "skipping event");
            return Ok(HandleOutcome::Skipped(reason));
        }

        let Some(orchestrator) = self.orchestrator.as_ref() else {
            tracing::warn!(target: "slaick.slack", "no completion API key configured");
            self.surface
                .post_message(&event.channel, MISSING_API_KEY_TEXT, None)
                .await?;
            return Ok(HandleOutcome::MissingApiKey);
        };

        let context = self.gather_context(event).await?;
        if context.is_empty() && !event.is_new_conversation() {
            return Ok(HandleOutcome::NoContext);
        }
        let context = if context.is_empty() {
            vec![event.to_surface_message()]
        } else {
            context
        };

        let model = orchestrator.config().model.as_str();
        let supports_vision = orchestrator.provider().supports_vision(model);
        let messages = self.build_messages(&context, supports_vision).await;

        let reply_thread = event.reply_thread_ts().to_string();
        let wip = self
            .surface
            .post_message(&event.channel, &self.options.loading_text, Some(&reply_thread))
            .await?;
        tracing::info!(
            target: "slaick.slack",
            channel = %event.channel,
            ts = %event.ts,
            wip = %wip,
            context_messages = context.len(),
            "replying to message"
        );

        let renderer = IncrementalRenderer::new(
            self.surface.clone(),
            RenderTarget::new(
                event.channel.clone(),
                Some(reply_thread),
                wip,
                self.options.loading_text.clone(),
            ),
            self.options.render.clone(),
        );
        let outcome = orchestrator
            .respond(messages, event.user.clone(), &renderer)
            .await?;
        Ok(HandleOutcome::Replied(outcome))
    }

    /// Surface messages the reply should consider, oldest first
    pub async fn gather_context(&self, event: &IncomingMessage) -> Result<Vec<SurfaceMessage>> {
        match event.thread_ts.as_deref() {
            None if event.is_dm() => {
                let mut history = self
                    .surface
                    .fetch_history(&event.channel, self.options.dm_history_limit)
                    .await?;
                history.reverse();
                let now = Utc::now().timestamp_millis() as f64 / 1000.0;
                let max_age = self.options.dm_max_age.as_secs_f64();
                history.retain(|m| now - m.ts_seconds() < max_age);
                Ok(history)
            }
            Some(thread_ts) => {
                self.surface
                    .fetch_thread_replies(&event.channel, thread_ts, self.options.thread_reply_limit)
                    .await
            }
            None => Ok(vec![event.to_surface_message()]),
        }
    }

    /// The window sent to the model: system prompt, then one message per surface message
    pub async fn build_messages(
        &self,
        context: &[SurfaceMessage],
        supports_vision: bool,
    ) -> Vec<Message> {
        let bot_user_id = self.gate.bot_user_id();
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(Message::system(self.options.system_prompt.clone()));

        for reply in context {
            let author = reply.user.as_deref().unwrap_or_default();
            let text = match &self.redactor {
                Some(redactor) => redactor.redact(&reply.text),
                None => reply.text.clone(),
            };
            let mut parts = vec![ContentPart::text(format!(
                "<@{}>: {}",
                author,
                format_message_for_model(&text, self.options.translate_markdown)
            ))];

            if reply.bot_id.is_none() && self.options.files_enabled && !reply.files.is_empty() {
                parts.extend(
                    attachment_parts(
                        self.surface.as_ref(),
                        &reply.files,
                        self.options.max_file_size,
                        supports_vision,
                    )
                    .await,
                );
            }

            let mut message = Message::user_parts(parts);
            if author == bot_user_id {
                message.role = Role::Assistant;
            }
            messages.push(message);
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::TurnConfig;
    use crate::config::RedactionConfig;
    use crate::functions::FunctionTable;
    use crate::llm::mock_provider::{Script, ScriptedProvider};
    use crate::slack::events::EventKind;
    use crate::slack::memory::SurfaceOp;
    use crate::slack::InMemorySurface;

    fn now_ts(offset_secs: i64) -> String {
        let millis = Utc::now().timestamp_millis() + offset_secs * 1000;
        format!("{}.{:06}", millis / 1000, (millis % 1000) * 1000)
    }

    fn mention(channel: &str, ts: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            kind: EventKind::AppMention,
            ..IncomingMessage::message(channel, "U1", ts, text)
        }
    }

    fn handler(
        surface: Arc<InMemorySurface>,
        provider: Option<ScriptedProvider>,
        settings: &Settings,
    ) -> MessageHandler {
        let orchestrator = provider.map(|provider| {
            Arc::new(ConversationOrchestrator::new(
                Arc::new(provider),
                Arc::new(FunctionTable::new()),
                TurnConfig {
                    model: "scripted-model".to_string(),
                    ..TurnConfig::from_settings(settings)
                },
            ))
        });
        MessageHandler::from_settings(settings, surface, orchestrator, "UBOT").unwrap()
    }

    #[tokio::test]
    async fn test_channel_mention_gets_threaded_reply() {
        let surface = Arc::new(InMemorySurface::new());
        let provider = ScriptedProvider::new().with_scripts(vec![Script::text(&["Hello!"])]);
        let settings = Settings::default();
        let handler = handler(surface.clone(), Some(provider.clone()), &settings);

        let event = mention("C1", "1.000001", "<@UBOT> hi");
        let outcome = handler.handle(&event).await.unwrap();
        assert_eq!(
            outcome,
            HandleOutcome::Replied(TurnOutcome::Completed {
                text: "Hello!".to_string(),
                function_calls: 0
            })
        );

        let ops = surface.ops();
        let SurfaceOp::Post { thread_ts, id, text, .. } = &ops[0] else {
            panic!("expected the in-progress post first");
        };
        assert_eq!(thread_ts.as_deref(), Some("1.000001"));
        assert_eq!(text, &settings.streaming.loading_text);
        assert_eq!(surface.message_text("C1", id).unwrap(), "Hello!");

        let request = provider.last_request().unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].text(), "<@U1>: <@UBOT> hi");
        assert_eq!(request.user.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn test_missing_api_key_notice() {
        let surface = Arc::new(InMemorySurface::new());
        let handler = handler(surface.clone(), None, &Settings::default());

        let event = mention("C1", "1.0", "<@UBOT> hi");
        assert_eq!(handler.handle(&event).await.unwrap(), HandleOutcome::MissingApiKey);
        assert_eq!(
            surface.ops(),
            vec![SurfaceOp::Post {
                channel: "C1".to_string(),
                thread_ts: None,
                id: "1700000000.000001".to_string(),
                text: MISSING_API_KEY_TEXT.to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_thread_context_assigns_roles() {
        let surface = Arc::new(InMemorySurface::new());
        surface.add_message("C1", SurfaceMessage::new("1.0", "U1", "<@UBOT> question"));
        let mut answer = SurfaceMessage::new("1.5", "UBOT", "answer");
        answer.thread_ts = Some("1.0".to_string());
        surface.add_message("C1", answer);

        let handler = handler(surface, None, &Settings::default());
        let mut event = IncomingMessage::message("C1", "U1", "2.0", "follow up");
        event.thread_ts = Some("1.0".to_string());

        let context = handler.gather_context(&event).await.unwrap();
        let messages = handler.build_messages(&context, false).await;
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(messages[2].text(), "<@UBOT>: answer");
    }

    #[tokio::test]
    async fn test_dm_history_is_recent_and_chronological() {
        let surface = Arc::new(InMemorySurface::new());
        surface.add_message("D1", SurfaceMessage::new("1600000000.000000", "U1", "ancient"));
        surface.add_message("D1", SurfaceMessage::new(now_ts(-60), "U1", "first"));
        surface.add_message("D1", SurfaceMessage::new(now_ts(-30), "U1", "second"));

        let handler = handler(surface, None, &Settings::default());
        let mut event = IncomingMessage::message("D1", "U1", now_ts(0), "second");
        event.channel_type = Some("im".to_string());

        let texts: Vec<String> = handler
            .gather_context(&event)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_redaction_applies_before_prefix() {
        let surface = Arc::new(InMemorySurface::new());
        let mut settings = Settings::default();
        settings.redaction = RedactionConfig {
            enabled: true,
            ..Default::default()
        };
        let handler = handler(surface, None, &settings);

        let context = vec![SurfaceMessage::new("1.0", "U1", "mail me at a@b.io")];
        let messages = handler.build_messages(&context, false).await;
        assert_eq!(messages[1].text(), "<@U1>: mail me at [EMAIL]");
    }

    #[tokio::test]
    async fn test_files_attached_only_when_enabled() {
        let surface = Arc::new(InMemorySurface::new());
        surface.add_file("https://files/notes.txt", b"remember".to_vec());
        let mut message = SurfaceMessage::new("1.0", "U1", "see file");
        message.files.push(crate::slack::SurfaceFile {
            name: "notes.txt".to_string(),
            filetype: Some("text".to_string()),
            mimetype: Some("text/plain".to_string()),
            size: 8,
            url_private: Some("https://files/notes.txt".to_string()),
        });

        let disabled = handler(surface.clone(), None, &Settings::default());
        let messages = disabled.build_messages(&[message.clone()], false).await;
        assert_eq!(messages[1].content.len(), 1);

        let mut settings = Settings::default();
        settings.files.enabled = true;
        let enabled = handler(surface, None, &settings);
        let messages = enabled.build_messages(&[message], false).await;
        assert_eq!(
            messages[1].content[1],
            ContentPart::text("File: notes.txt\n```remember```")
        );
    }
}
