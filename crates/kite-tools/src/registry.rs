//! Tool registry: per-session index of registered tools.
//!
//! Registration order is preserved (it is the order tools are announced to
//! the backend) and names are unique: registering a second tool under an
//! existing name is an error, never a silent overwrite.

use std::sync::Arc;

use indexmap::IndexMap;
use kite_core::tools::ToolDefinition;
use tracing::debug;

use crate::errors::RegistryError;
use crate::traits::KiteTool;

/// Ordered map from tool name to implementation.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn KiteTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an ordered list, rejecting duplicates.
    pub fn from_tools(
        tools: impl IntoIterator<Item = Arc<dyn KiteTool>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Arc<dyn KiteTool>) -> Result<(), RegistryError> {
        let name = tool.name().to_owned();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateName { name });
        }
        debug!(tool_name = %name, "tool registered");
        let _ = self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn KiteTool>> {
        self.tools.get(name).cloned()
    }

    /// Tool schemas in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Whether a tool with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
