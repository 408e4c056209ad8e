//! Tool definition types.
//!
//! A [`ToolDefinition`] is what the backend sees of a tool: its name,
//! description, and JSON Schema for the parameters. Handlers live in
//! `kite-tools`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON Schema-compatible parameter definition for a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolParameterSchema {
    /// Top-level JSON Schema type.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property definitions (when type is `object`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, Value>>,
    /// Required property names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Catch-all for additional JSON Schema properties.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ToolParameterSchema {
    /// An empty `object` schema.
    #[must_use]
    pub fn object() -> Self {
        Self {
            schema_type: "object".into(),
            properties: None,
            required: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Add a property, optionally marking it required.
    #[must_use]
    pub fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        let _ = self
            .properties
            .get_or_insert_with(serde_json::Map::new)
            .insert(name.to_owned(), schema);
        if required {
            self.required.get_or_insert_with(Vec::new).push(name.to_owned());
        }
        self
    }
}

impl Default for ToolParameterSchema {
    fn default() -> Self {
        Self::object()
    }
}

/// A tool definition announced to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within a session.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: ToolParameterSchema,
}
