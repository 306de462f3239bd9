// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation handling
//!
//! Trimming the window, streaming a reply onto the messaging surface and
//! running function calls in between.

pub mod engine;
pub mod flush;
pub mod formatting;
pub mod redaction;
pub mod render;
pub mod split;
pub mod streaming;
pub mod trim;

pub use engine::{ConversationOrchestrator, TurnConfig, TurnOutcome};
pub use flush::{FlushScheduler, FlushStats};
pub use redaction::Redactor;
pub use render::{IncrementalRenderer, RenderOptions, RenderTarget};
pub use split::{split, split_chunks, Chunk};
pub use streaming::{StreamConsumer, StreamOutcome};
pub use trim::{trim, TokenBudget, TrimReport};
