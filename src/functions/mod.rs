// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Functions the model may call
//!
//! A [`FunctionTable`] maps function names to callables. Arguments arrive as
//! a JSON object string and results go back to the model as text.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Result, SlaickError};
use crate::llm::{FunctionCall, FunctionDefinition};

pub mod builtin;

/// A function callable by the model
#[async_trait]
pub trait Function: Send + Sync {
    /// Definition offered to the model
    fn definition(&self) -> FunctionDefinition;

    /// Run with parsed arguments and return the text handed back to the model
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String>;
}

/// Registry of callable functions
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, Arc<dyn Function>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every builtin function
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register(Arc::new(builtin::CurrentTime));
        table
    }

    /// Register a function under its definition's name, replacing any previous one
    pub fn register(&mut self, function: Arc<dyn Function>) {
        let name = function.definition().name;
        self.functions.insert(name, function);
    }

    pub fn resolve(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.get(name)
    }

    /// Definitions in name order
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.functions.values().map(|f| f.definition()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Parse the call's arguments, then run the named function.
    pub async fn execute(&self, call: &FunctionCall) -> Result<String> {
        let arguments = parse_arguments(call)?;
        let function = self
            .resolve(&call.name)
            .ok_or_else(|| SlaickError::UnknownFunction(call.name.clone()))?;

        tracing::info!(
            target: "slaick.functions",
            function = %call.name,
            "executing function call"
        );
        let result = function.invoke(arguments).await;
        if let Err(ref e) = result {
            tracing::warn!(
                target: "slaick.functions",
                function = %call.name,
                error = %e,
                "function call failed"
            );
        }
        result
    }
}

/// Parse function-call arguments. Blank arguments mean an empty object.
pub fn parse_arguments(call: &FunctionCall) -> Result<Map<String, Value>> {
    let argument_error = |message: String| SlaickError::ArgumentParse {
        function: call.name.clone(),
        message,
    };

    if call.arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(argument_error(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(argument_error(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
