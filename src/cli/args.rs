// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::slack::events::{EventKind, IncomingMessage};

/// Slaick - Slack bot that streams LLM replies into threads
#[derive(Parser, Debug)]
#[command(name = "slaick")]
#[command(version, about = "Slack bot that streams LLM replies into threads")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reply to one Slack message event
    Reply(ReplyArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

/// Arguments for the reply command
#[derive(Args, Debug, Clone)]
pub struct ReplyArgs {
    /// Channel ID
    #[arg(long)]
    pub channel: String,

    /// Timestamp of the message to reply to
    #[arg(long)]
    pub ts: String,

    /// Thread the message belongs to
    #[arg(long)]
    pub thread_ts: Option<String>,

    /// Channel type (`im` or `mpim` for direct messages)
    #[arg(long)]
    pub channel_type: Option<String>,

    /// Author of the message
    #[arg(long)]
    pub user: Option<String>,

    /// Treat the event as an app mention
    #[arg(long)]
    pub mention: bool,

    /// Message text
    #[arg(long)]
    pub text: String,
}

impl ReplyArgs {
    pub fn into_event(self) -> IncomingMessage {
        IncomingMessage {
            kind: if self.mention {
                EventKind::AppMention
            } else {
                EventKind::Message
            },
            channel: self.channel,
            channel_type: self.channel_type,
            user: self.user,
            ts: self.ts,
            thread_ts: self.thread_ts,
            text: self.text,
            bot_id: None,
            subtype: None,
            files: Vec::new(),
        }
    }
}

/// Arguments for the config command
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Print the full settings as JSON (secrets masked)
    #[arg(long)]
    pub json: bool,
}
