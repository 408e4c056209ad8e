//! Closure-backed tools.
//!
//! [`FnTool`] lets an application define a tool inline instead of writing a
//! [`KiteTool`] impl:
//!
//! ```ignore
//! let tool = FnTool::typed(
//!     "list_local_files",
//!     "Get files in a local directory",
//!     schema,
//!     |args: ListArgs, _ctx| async move { list(&args.directory) },
//! );
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use kite_core::tools::{ToolDefinition, ToolParameterSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ToolError;
use crate::traits::{KiteTool, ToolContext};

type Handler =
    Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync>;

/// A tool whose handler is an async closure.
#[derive(Clone)]
pub struct FnTool {
    definition: ToolDefinition,
    timeout_ms: Option<u64>,
    handler: Handler,
}

impl FnTool {
    /// Build a tool from a closure over raw JSON input.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameterSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            timeout_ms: None,
            handler: Arc::new(move |params, ctx| handler(params, ctx).boxed()),
        }
    }

    /// Build a tool whose input is deserialized into `P` first.
    ///
    /// A `null` input is treated as `{}` so parameter structs with
    /// `#[serde(default)]` fields accept a bare call. Input that does not
    /// match `P` fails the call with [`ToolError::Validation`].
    pub fn typed<P, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameterSchema,
        handler: F,
    ) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(name, description, parameters, move |params, ctx| {
            let handler = handler.clone();
            async move {
                let params = if params.is_null() {
                    Value::Object(serde_json::Map::new())
                } else {
                    params
                };
                let typed: P = serde_json::from_value(params).map_err(|e| ToolError::Validation {
                    message: e.to_string(),
                })?;
                handler(typed, ctx).await
            }
        })
    }

    /// Override the session's default handler timeout for this tool.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

#[async_trait]
impl KiteTool for FnTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        (self.handler)(params, ctx.clone()).await
    }
}
