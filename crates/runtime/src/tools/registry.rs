//! Snapshot of the tools a provider advertised at one point in time.

use std::collections::HashMap;

use tracing::warn;

use crate::llm::ToolSpec;

/// Immutable tool catalog, in provider order, with unique names.
///
/// The registry is informational: it is forwarded to the completion service
/// and consulted for lookups, but tools are always executed through the
/// [`ToolHost`](super::ToolHost).
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry. Later duplicates of a name are dropped.
    pub fn new(specs: impl IntoIterator<Item = ToolSpec>) -> Self {
        let mut registry = Self::default();
        for spec in specs {
            if registry.by_name.contains_key(&spec.name) {
                warn!(tool = %spec.name, "duplicate tool name in catalog, keeping the first");
                continue;
            }
            registry
                .by_name
                .insert(spec.name.clone(), registry.specs.len());
            registry.specs.push(spec);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.by_name.get(name).map(|&i| &self.specs[i])
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|spec| spec.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, description: &str) -> ToolSpec {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            input_schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn lookup_by_name_keeps_order() {
        let registry = ToolRegistry::new([spec("get_alerts", "a"), spec("get_forecast", "f")]);
        assert_eq!(registry.names(), vec!["get_alerts", "get_forecast"]);
        assert_eq!(registry.get("get_forecast").unwrap().description, "f");
        assert!(registry.get("get_tides").is_none());
    }

    #[test]
    fn duplicate_names_keep_first() {
        let registry = ToolRegistry::new([spec("echo", "first"), spec("echo", "second")]);
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.get("echo").unwrap().description, "first");
    }
}
