//! Structured output.

use std::fmt::{self, Debug};
use std::sync::Arc;

use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

type ValidateFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// The shape the final answer of a run must have.
///
/// When an agent has a response format, its instructions are appended to
/// the system prompt, and the final assistant message is parsed as JSON and
/// checked against the format before it's committed.
#[derive(Clone)]
pub struct ResponseFormat {
    name: String,
    schema: Value,
    validate: ValidateFn,
}

impl ResponseFormat {
    /// Declares a format from a Rust type.
    ///
    /// The JSON schema comes from [`JsonSchema`], and a value is valid if it
    /// deserializes into `T`.
    pub fn of<T: JsonSchema + DeserializeOwned + 'static>() -> Self {
        Self {
            name: T::schema_name().into_owned(),
            schema: schema_for!(T).to_value(),
            validate: Arc::new(|value| {
                serde_json::from_value::<T>(value.clone())
                    .map(drop)
                    .map_err(|err| err.to_string())
            }),
        }
    }

    /// Returns the name of the format.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the JSON schema.
    #[inline]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Returns the instructions for the model.
    pub fn instructions(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.schema)
            .unwrap_or_else(|_| self.schema.to_string());
        format!(
            "When you give your final answer, reply with a single JSON value \
             (`{}`) matching the following JSON schema, and nothing else.\n\
             {schema}",
            self.name
        )
    }

    /// Parses and validates a final answer.
    ///
    /// Markdown code fences around the JSON are tolerated.
    pub fn coerce(&self, text: &str) -> Result<Value, Error> {
        let value: Value = serde_json::from_str(strip_code_fence(text))
            .map_err(|err| {
                Error::SchemaValidation(format!("not a JSON value: {err}"))
            })?;
        (self.validate)(&value).map_err(Error::SchemaValidation)?;
        Ok(value)
    }
}

impl Debug for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFormat")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string, e.g. "json".
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
