// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Slaick - Slack bot that streams LLM replies into threads
//!
//! Entry point for the Slaick CLI application.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use slaick::chat::{ConversationOrchestrator, TurnConfig, TurnOutcome};
use slaick::cli::{Cli, Commands, ConfigArgs, ReplyArgs};
use slaick::config::{ProcessEnv, Settings};
use slaick::error::{Result, SlaickError};
use slaick::functions::FunctionTable;
use slaick::llm::factory::ProviderFactory;
use slaick::slack::{HandleOutcome, MessageHandler, SlackClient};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    settings.apply_env(&ProcessEnv)?;

    init_tracing(&settings, cli.verbose);
    settings.validate()?;

    match cli.command {
        Commands::Reply(args) => run_reply(args, settings).await,
        Commands::Config(args) => run_config(args, &settings, cli.config.as_deref()),
    }
}

fn init_tracing(settings: &Settings, verbose: u8) {
    // RUST_LOG wins over the configured level.
    let mut env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("warn,slaick={}", settings.log_level))
    });

    if verbose > 0 {
        let directive = if verbose > 1 { "slaick=trace" } else { "slaick=debug" };
        if let Ok(parsed) = directive.parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_reply(args: ReplyArgs, mut settings: Settings) -> Result<()> {
    let bot_token = settings.bot_token(&ProcessEnv).ok_or_else(|| {
        SlaickError::Config(format!(
            "No Slack bot token configured. Set {} or slack.bot_token in the settings file",
            settings.slack.bot_token_env
        ))
    })?;
    let client = Arc::new(SlackClient::new(bot_token).with_base_url(&settings.slack.base_url));

    let bot_user_id = match settings.slack.bot_user_id.clone() {
        Some(id) => id,
        None => {
            let identity = client.auth_test().await?;
            tracing::info!(target: "slaick.slack", user_id = %identity.user_id, "resolved bot identity");
            if settings.slack.bot_id.is_none() {
                settings.slack.bot_id = identity.bot_id;
            }
            identity.user_id
        }
    };

    let orchestrator = ProviderFactory::create(&settings, &ProcessEnv)?.map(|provider| {
        let functions = if settings.functions.enable_builtin {
            FunctionTable::with_builtins()
        } else {
            FunctionTable::new()
        };
        Arc::new(ConversationOrchestrator::new(
            provider,
            Arc::new(functions),
            TurnConfig::from_settings(&settings),
        ))
    });

    let handler = MessageHandler::from_settings(&settings, client, orchestrator, &bot_user_id)?;
    let event = args.into_event();
    match handler.handle(&event).await? {
        HandleOutcome::Skipped(reason) => eprintln!("Skipped: {}", reason),
        HandleOutcome::MissingApiKey => eprintln!("No completion API key configured; posted notice"),
        HandleOutcome::NoContext => eprintln!("Nothing to reply to"),
        HandleOutcome::Replied(TurnOutcome::Superseded) => {
            eprintln!("Reply superseded by a newer message")
        }
        HandleOutcome::Replied(TurnOutcome::Completed { text, .. }) => println!("{}", text),
    }
    Ok(())
}

fn run_config(args: ConfigArgs, settings: &Settings, path: Option<&Path>) -> Result<()> {
    if args.json {
        println!("{}", settings.to_redacted_json()?);
        return Ok(());
    }

    let path = path.map(Path::to_path_buf).unwrap_or_else(Settings::default_path);
    println!("Config file:     {}", path.display());
    println!("Provider:        {} ({})", settings.provider.name, settings.provider.model);
    println!("API base URL:    {}", settings.provider.base_url);
    println!(
        "API key:         {}",
        if settings.api_key(&ProcessEnv).is_some() { "set" } else { "missing" }
    );
    println!(
        "Slack token:     {}",
        if settings.bot_token(&ProcessEnv).is_some() { "set" } else { "missing" }
    );
    println!("Timeout:         {}s", settings.conversation.timeout_seconds);
    println!("Redaction:       {}", settings.redaction.enabled);
    println!("File handling:   {}", settings.files.enabled);
    Ok(())
}
