// src/tools/schema.rs
//! JSON Schema helpers for capability definitions
//!
//! Capabilities advertise themselves to the model with an OpenAI-style
//! function spec; [`SchemaBuilder`] assembles the `parameters` object.

use serde_json::{json, Map, Value};

/// Builder for creating JSON Schema objects
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
    description: Option<String>,
}

impl SchemaBuilder {
    /// Create a new object schema builder
    pub fn object() -> Self {
        Self::default()
    }

    /// Add a description to the schema
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    fn typed_prop(
        mut self,
        name: impl Into<String>,
        prop_type: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            json!({
                "type": prop_type,
                "description": description.into()
            }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    /// Add a string property
    pub fn string_prop(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.typed_prop(name, "string", description, required)
    }

    /// Add an integer property
    pub fn integer_prop(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.typed_prop(name, "integer", description, required)
    }

    /// Attach a default to a property added earlier; unknown names are ignored
    pub fn default_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(Value::Object(prop)) = self.properties.get_mut(name) {
            prop.insert("default".to_string(), value.into());
        }
        self
    }

    /// Build the final JSON Schema
    pub fn build(self) -> Value {
        let mut schema = json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required
        });

        if let Some(desc) = self.description {
            schema["description"] = json!(desc);
        }

        schema
    }
}

/// Wrap a parameters schema into a `{"type": "function", ..}` definition
pub fn function_spec(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder() {
        let schema = SchemaBuilder::object()
            .string_prop("keywords", "The keywords to search for", true)
            .integer_prop("max_results", "How many results", false)
            .default_value("max_results", 5)
            .default_value("missing", 1)
            .build();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["keywords"]));
        assert_eq!(schema["properties"]["max_results"]["type"], "integer");
        assert_eq!(schema["properties"]["max_results"]["default"], 5);
        assert!(schema["properties"].get("missing").is_none());
        assert!(schema.get("description").is_none());
    }

    #[test]
    fn test_function_spec_shape() {
        let spec = function_spec("echo", "Echo text", SchemaBuilder::object().build());
        assert_eq!(spec["type"], "function");
        assert_eq!(spec["function"]["name"], "echo");
        assert_eq!(spec["function"]["parameters"]["type"], "object");
    }
}
