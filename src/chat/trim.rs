// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Token budget trimming
//!
//! Drops the oldest non-system messages until the window fits the prompt
//! budget. The system message is never removed; when only it remains and the
//! window still does not fit, the overflow is reported to the caller.

use crate::error::Result;
use crate::llm::message::Message;

/// Prompt budget for one completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Context window of the model
    pub model_context_limit: u32,
    /// Tokens held back for the reply
    pub reserved_response_tokens: u32,
    /// Tokens held back for function definitions
    pub reserved_function_tokens: u32,
}

impl TokenBudget {
    pub fn new(
        model_context_limit: u32,
        reserved_response_tokens: u32,
        reserved_function_tokens: u32,
    ) -> Self {
        Self {
            model_context_limit,
            reserved_response_tokens,
            reserved_function_tokens,
        }
    }

    /// Budget for a turn: the reply reservation carries one token of slack,
    /// and the function reserve only applies when functions are offered.
    pub fn for_turn(
        model_context_limit: u32,
        max_response_tokens: u32,
        function_reserve: u32,
        has_functions: bool,
    ) -> Self {
        Self::new(
            model_context_limit,
            max_response_tokens.saturating_add(1),
            if has_functions { function_reserve } else { 0 },
        )
    }

    /// Tokens left for the prompt
    pub fn available(&self) -> u32 {
        self.model_context_limit
            .saturating_sub(self.reserved_response_tokens)
            .saturating_sub(self.reserved_function_tokens)
    }
}

/// Outcome of a trim pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimReport {
    /// Tokens used by the messages left in the window
    pub used_tokens: u32,
    /// Tokens the window may use
    pub available_tokens: u32,
    /// Messages removed by this pass
    pub removed: usize,
}

impl TrimReport {
    /// Whether the window now fits the budget
    pub fn fits(&self) -> bool {
        self.used_tokens <= self.available_tokens
    }
}

/// Trim `messages` in place to fit `budget`.
///
/// `counter` is called once per message; its results are cached for the pass.
pub fn trim<F>(messages: &mut Vec<Message>, mut counter: F, budget: &TokenBudget) -> Result<TrimReport>
where
    F: FnMut(&Message) -> Result<u32>,
{
    let available_tokens = budget.available();
    let mut counts = messages
        .iter()
        .map(&mut counter)
        .collect::<Result<Vec<u32>>>()?;
    let mut used_tokens: u32 = counts.iter().sum();
    let mut removed = 0;

    while used_tokens > available_tokens {
        let Some(index) = messages.iter().position(|m| !m.is_system()) else {
            break;
        };
        messages.remove(index);
        used_tokens -= counts.remove(index);
        removed += 1;
    }

    if removed > 0 {
        tracing::debug!(
            target: "slaick.chat.trim",
            removed,
            used_tokens,
            available_tokens,
            "trimmed conversation window"
        );
    }

    Ok(TrimReport {
        used_tokens,
        available_tokens,
        removed,
    })
}
