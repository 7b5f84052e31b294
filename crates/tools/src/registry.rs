//! The tool registry: definitions plus their schemas compiled once.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use rv_domain::Result;

use crate::definition::ToolDefinition;
use crate::schema::CompiledSchema;

/// A definition with its validators ready to run.
pub struct RegisteredTool {
    pub def: ToolDefinition,
    pub input: CompiledSchema,
    pub output: Option<CompiledSchema>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, compiling its schemas. A second registration
    /// under the same name replaces the first.
    pub fn register(&mut self, def: ToolDefinition) -> Result<()> {
        let input = CompiledSchema::compile(&def.input_schema)?;
        let output = match &def.output_schema {
            Some(schema) => Some(CompiledSchema::compile(schema)?),
            None => None,
        };
        self.tools.insert(
            def.name.clone(),
            Arc::new(RegisteredTool { def, input, output }),
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions in the shape the LLM prompt needs: name,
    /// description, input schema.
    pub fn prompt_catalog(&self) -> Vec<Value> {
        let mut catalog: Vec<Value> = self
            .tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.def.name,
                    "description": t.def.description,
                    "parameters": t.def.input_schema,
                })
            })
            .collect();
        catalog.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or_default()
                .cmp(b["name"].as_str().unwrap_or_default())
        });
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ToolContext, ToolHandler};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
            Ok(args)
        }
    }

    fn simple_def(name: &str) -> ToolDefinition {
        ToolDefinition::new(
            name,
            "echo",
            serde_json::json!({"type": "object"}),
            Arc::new(Echo),
        )
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(simple_def("echo")).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("absent").is_none());
        assert_eq!(registry.names(), vec!["echo".to_string()]);
    }

    #[test]
    fn bad_schema_is_rejected() {
        let mut registry = ToolRegistry::new();
        let mut def = simple_def("broken");
        def.input_schema = serde_json::json!({"type": "not-a-type"});
        assert!(registry.register(def).is_err());
    }

    #[test]
    fn prompt_catalog_is_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(simple_def("zeta")).unwrap();
        registry.register(simple_def("alpha")).unwrap();
        let catalog = registry.prompt_catalog();
        assert_eq!(catalog[0]["name"], "alpha");
        assert_eq!(catalog[1]["name"], "zeta");
    }
}
