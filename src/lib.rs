// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Slaick - Slack assistant that streams language-model replies.
//!
//! This crate exposes the runtime used by the `slaick` CLI (`src/main.rs`).
//!
//! Architecture highlights:
//! - `chat`: token-budget trimming, chunk splitting, incremental rendering,
//!   flush scheduling, stream consumption and the turn orchestrator
//! - `llm`: message model and completion providers (OpenAI-compatible, scripted)
//! - `slack`: messaging surface abstraction, Web API client, event gating
//! - `functions`: statically registered functions the model may call
//! - `config`: settings file plus environment overrides

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod functions;
pub mod llm;
pub mod slack;

pub use error::{Result, SlaickError};
