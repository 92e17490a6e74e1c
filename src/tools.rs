//! # Tool system
//!
//! Tools are named, schema-described functions the model can call. The
//! module provides:
//!
//! 1. **Tool definition** — [`Tool`] couples metadata (name, description,
//!    parameter schema) with an async handler returning owned text.
//! 2. **Schema generation** — simple `{"a": "integer"}` notation and full
//!    JSON Schema both normalize to the `{type, properties, required}`
//!    object providers expect. Parameter types are `string`, `integer`,
//!    `number`, and `boolean`.
//! 3. **The registry** — [`ToolRegistry`] holds tools in registration
//!    order, rejects duplicate names, advertises [`ToolSpec`]s to the
//!    LLM, and decodes+dispatches incoming calls.
//!
//! ## Invocation Path
//!
//! ```text
//! model emits tool_use ──▶ registry.invoke(name, args)
//!     │ name lookup        (UnknownTool on miss)
//!     │ argument decoding  (SchemaMismatch on missing/uncoercible)
//!     ▼
//! handler(decoded args) ──▶ Ok(text) | Err(...)
//! ```
//!
//! Failures never abort the agent loop: the loop serializes them back to
//! the model as an error-marked tool result and continues.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use agentry::tool;
//!
//! let add = tool("add", "Add two integers")
//!     .param("a", "integer")
//!     .param("b", "integer")
//!     .build(|args| async move {
//!         let a = args["a"].as_i64().unwrap_or(0);
//!         let b = args["b"].as_i64().unwrap_or(0);
//!         Ok((a + b).to_string())
//!     });
//! ```

use crate::types::ToolSpec;
use crate::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::trace;

/// Type alias for tool handler functions.
///
/// Handlers take the decoded argument object and return owned text. The
/// `Arc<dyn Fn ... Pin<Box<dyn Future>>>` shape erases each handler's
/// concrete future type so heterogeneous tools share one registry, and
/// keeps handlers cheap to clone and safe to call from many tasks.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync>;

/// A named, schema-described function callable by the model.
///
/// Immutable once built; cloning shares the handler.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    /// Normalized JSON Schema: `{type: object, properties, required}`
    parameters: Value,
    handler: ToolHandler,
}

impl Tool {
    /// Create a tool with a flexible schema definition.
    ///
    /// Accepted schema shapes:
    ///
    /// - simple notation: `{"location": "string", "count": "integer"}`
    ///   (every parameter required)
    /// - extended properties: `{"q": {"type": "string", "description":
    ///   "...", "optional": true}}`
    /// - full JSON Schema (`type` + `properties` present): passed through
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: normalize_schema(schema),
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Run the handler with already-decoded arguments.
    pub async fn execute(&self, arguments: Value) -> Result<String> {
        (self.handler)(arguments).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The normalized parameter schema.
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Advertisement embedded into requests by the provider adapter.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            // Handler omitted: closures have no useful Debug output.
            .finish()
    }
}

// ============================================================================
// SCHEMA NORMALIZATION
// ============================================================================

/// Tool names the providers accept.
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Normalize the accepted schema shapes to JSON Schema.
fn normalize_schema(schema: Value) -> Value {
    let Some(object) = schema.as_object() else {
        return serde_json::json!({"type": "object", "properties": {}, "required": []});
    };

    // Already full JSON Schema.
    if object.contains_key("type") && object.contains_key("properties") {
        return schema;
    }

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for (name, definition) in object {
        if let Some(type_str) = definition.as_str() {
            // Simple notation: always required.
            properties.insert(name.clone(), type_schema(type_str));
            required.push(name.clone());
        } else if definition.is_object() {
            let mut property = definition.clone();
            let property_object = property.as_object_mut().expect("checked is_object");

            let optional = property_object
                .remove("optional")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let has_default = property_object.contains_key("default");

            properties.insert(name.clone(), property);
            if !optional && !has_default {
                required.push(name.clone());
            }
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Map a type alias to its JSON Schema type object.
fn type_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        // Unknown aliases degrade to string rather than failing tool
        // construction.
        _ => "string",
    };
    serde_json::json!({"type": json_type})
}

/// Format a floating-point tool result in a stable, locale-independent
/// decimal form. NaN is a tool error; integral values drop the fraction.
pub fn format_decimal(value: f64) -> Result<String> {
    if value.is_nan() {
        return Err(Error::invalid_arg("numeric result is NaN"));
    }
    if value.is_infinite() {
        return Err(Error::invalid_arg("numeric result is infinite"));
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Ok(format!("{}", value as i64))
    } else {
        Ok(format!("{value}"))
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Ordered set of tools with unique names.
///
/// Built up front, then shared read-only: concurrent agents may read one
/// registry, but registration is not thread-safe and happens before use.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// `InvalidArg` when the name does not match
    /// `[A-Za-z_][A-Za-z0-9_]*` or a tool with the same name is already
    /// registered.
    pub fn add(&mut self, tool: Tool) -> Result<()> {
        if !valid_name(tool.name()) {
            return Err(Error::invalid_arg(format!(
                "tool name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                tool.name()
            )));
        }
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            return Err(Error::invalid_arg(format!(
                "tool '{}' is already registered",
                tool.name()
            )));
        }
        self.tools.push(Arc::new(tool));
        Ok(())
    }

    /// Number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Advertisements for every tool, in registration order.
    pub fn advertise(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Decode arguments against the tool's schema and run its handler.
    ///
    /// # Errors
    ///
    /// - `UnknownTool` when no tool has that name
    /// - `SchemaMismatch` when a required parameter is missing or a value
    ///   fails type coercion
    /// - whatever the handler itself returns
    pub async fn invoke(&self, name: &str, arguments: &Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;

        let decoded = decode_arguments(tool.parameters(), arguments)?;
        trace!(tool = name, "invoking tool");
        tool.execute(decoded).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Validate and coerce call arguments against a normalized schema.
///
/// Returns a fresh object with coerced values. Parameters absent from
/// the schema pass through untouched — models occasionally volunteer
/// extras and handlers may want them.
fn decode_arguments(schema: &Value, arguments: &Value) -> Result<Value> {
    let empty = serde_json::Map::new();
    let supplied = arguments.as_object().unwrap_or(&empty);

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    for name in schema
        .get("required")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
    {
        if !supplied.contains_key(name) {
            return Err(Error::schema_mismatch(format!(
                "missing required parameter '{name}'"
            )));
        }
    }

    let mut decoded = serde_json::Map::new();
    for (name, value) in supplied {
        let coerced = match properties
            .get(name)
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
        {
            Some(type_name) => coerce(name, type_name, value)?,
            None => value.clone(),
        };
        decoded.insert(name.clone(), coerced);
    }

    Ok(Value::Object(decoded))
}

fn coerce(name: &str, type_name: &str, value: &Value) -> Result<Value> {
    let mismatch = || {
        Error::schema_mismatch(format!(
            "parameter '{name}' is not coercible to {type_name}"
        ))
    };

    match type_name {
        "string" => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        "integer" => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => {
                // Accept floats that carry an integral value.
                let f = n.as_f64().ok_or_else(mismatch)?;
                if f.fract() == 0.0 {
                    Ok(Value::from(f as i64))
                } else {
                    Err(mismatch())
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        "number" => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        "boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        _ => Ok(value.clone()),
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Fluent builder for tools; start with [`tool()`].
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    /// Replace the whole schema (any shape [`Tool::new`] accepts).
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Add one required parameter by type alias (`"string"`, `"integer"`,
    /// `"number"`, `"boolean"`).
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        self.schema
            .as_object_mut()
            .expect("schema initialized as object")
            .insert(name.to_string(), Value::String(type_str.to_string()));
        self
    }

    /// Finalize with a handler.
    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }
}

/// Create a tool using the builder pattern.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}
