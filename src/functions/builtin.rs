// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Builtin functions

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde_json::{json, Map, Value};

use crate::error::{Result, SlaickError};
use crate::llm::FunctionDefinition;

use super::Function;

/// Reports the current date and time
pub struct CurrentTime;

#[async_trait]
impl Function for CurrentTime {
    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: "current_time".to_string(),
            description: "Get the current date and time in RFC 3339 format.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "utc_offset": {
                        "type": "string",
                        "description": "Offset from UTC such as +09:00 or -05:30 (default: UTC)"
                    }
                }
            }),
        }
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String> {
        let offset = match arguments.get("utc_offset").and_then(Value::as_str) {
            Some(raw) => parse_offset(raw)?,
            None => FixedOffset::east_opt(0).ok_or_else(|| offset_error("UTC"))?,
        };
        Ok(Utc::now().with_timezone(&offset).to_rfc3339())
    }
}

/// Parse `UTC`, `Z` or `±HH:MM`.
fn parse_offset(raw: &str) -> Result<FixedOffset> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0).ok_or_else(|| offset_error(raw));
    }

    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => return Err(offset_error(raw)),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(hours) || !all_digits(minutes) {
        return Err(offset_error(raw));
    }
    let hours: u8 = hours.parse().map_err(|_| offset_error(raw))?;
    let minutes: u8 = minutes.parse().map_err(|_| offset_error(raw))?;
    if hours > 23 || minutes > 59 {
        return Err(offset_error(raw));
    }

    let seconds = i32::from(hours) * 3600 + i32::from(minutes) * 60;
    FixedOffset::east_opt(sign * seconds).ok_or_else(|| offset_error(raw))
}

fn offset_error(raw: &str) -> SlaickError {
    SlaickError::FunctionExecution(format!("invalid UTC offset: {}", raw))
}
