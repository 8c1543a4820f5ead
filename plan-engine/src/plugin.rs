// Plugin Module
// Execution contract and registry for pluggable stage workers

use crate::execution::context::ExecutionContext;
use crate::model::StageResult;

use serde::{Deserialize, Serialize};

// Re-exported so plugin implementations need no direct tokio-util
// dependency
pub use tokio_util::sync::CancellationToken;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Error escaping a plugin call. Structured failures should instead be
/// returned as a `StageResult` with `success: false`; anything surfacing
/// through this type is wrapped as a stage execution error.
pub type PluginError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Identity and description of a registered plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Registry key; stages reference plugins by this name
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

impl PluginManifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Trait for stage execution plugins
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    /// Manifest used as the registry key
    fn manifest(&self) -> PluginManifest;

    /// Execute one stage attempt.
    ///
    /// The engine imposes the stage timeout externally. The token is
    /// cancelled when the attempt is abandoned (timeout or plan
    /// cancellation); plugins that ignore it keep running detached and
    /// their eventual result is discarded.
    async fn execute(
        &self,
        ctx: ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<StageResult, PluginError>;
}

/// Registry of execution plugins, keyed by manifest name.
///
/// Owned by one engine instance; multiple engines carry independent
/// registries.
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
        }
    }

    /// Register a plugin under its manifest name, replacing any prior
    /// registration with the same name
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        let name = plugin.manifest().name;
        self.plugins
            .write()
            .expect("plugin registry lock poisoned")
            .insert(name, plugin);
    }

    /// Look up a plugin by name
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .expect("plugin registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Names of all registered plugins
    pub fn names(&self) -> Vec<String> {
        self.plugins
            .read()
            .expect("plugin registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubPlugin {
        name: &'static str,
        version: &'static str,
    }

    #[async_trait::async_trait]
    impl Plugin for StubPlugin {
        fn manifest(&self) -> PluginManifest {
            PluginManifest::new(self.name, self.version)
        }

        async fn execute(
            &self,
            _ctx: ExecutionContext,
            _cancel: CancellationToken,
        ) -> Result<StageResult, PluginError> {
            Ok(StageResult::success(None))
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(StubPlugin {
            name: "scraper",
            version: "1.0.0",
        }));

        assert!(registry.resolve("scraper").is_some());
        assert!(registry.resolve("unknown").is_none());
    }

    #[test]
    fn test_register_overwrites_same_name() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(StubPlugin {
            name: "scraper",
            version: "1.0.0",
        }));
        registry.register(Arc::new(StubPlugin {
            name: "scraper",
            version: "2.0.0",
        }));

        assert_eq!(registry.names().len(), 1);
        let manifest = registry.resolve("scraper").unwrap().manifest();
        assert_eq!(manifest.version, "2.0.0");
    }
}
