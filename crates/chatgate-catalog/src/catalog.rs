use std::sync::Arc;

use chrono::Utc;
use chatgate_config::{KvStore, StoreError};
use chatgate_types::{ModelDescriptor, TestRun};

use crate::classify::{default_rules, CategoryRules};

/// Storage key for the persisted model list.
pub const MODELS_KEY: &str = "chatgate-models";
/// Storage key for the persisted category pattern overrides.
pub const CATEGORIES_KEY: &str = "chatgate-system-categories";

/// Model catalog persisted through an injected [`KvStore`].
///
/// The catalog owns neither the storage nor the category rules; it loads them
/// on demand and writes back on mutation, so concurrent gateways sharing a
/// store see each other's updates on next read.
#[derive(Clone)]
pub struct ModelCatalog {
    store: Arc<dyn KvStore>,
}

impl ModelCatalog {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn models(&self) -> Result<Vec<ModelDescriptor>, StoreError> {
        match self.store.get(MODELS_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn replace_models(&self, models: Vec<ModelDescriptor>) -> Result<(), StoreError> {
        self.store
            .set(MODELS_KEY, serde_json::to_value(models)?)
            .await
    }

    /// Stored category overrides, or the built-in defaults when none exist
    /// or the stored value does not parse.
    pub async fn category_rules(&self) -> Result<CategoryRules, StoreError> {
        match self.store.get(CATEGORIES_KEY).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(rules) => Ok(rules),
                Err(error) => {
                    tracing::warn!(%error, "stored category patterns invalid, using defaults");
                    Ok(default_rules())
                }
            },
            None => Ok(default_rules()),
        }
    }

    pub async fn set_category(
        &self,
        name: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Result<CategoryRules, StoreError> {
        let mut rules = self.category_rules().await?;
        rules.set(name, pattern);
        self.store
            .set(CATEGORIES_KEY, serde_json::to_value(&rules)?)
            .await?;
        Ok(rules)
    }

    pub async fn reset_categories(&self) -> Result<CategoryRules, StoreError> {
        self.store.remove(CATEGORIES_KEY).await?;
        Ok(default_rules())
    }

    pub async fn classify(&self, model_id: &str) -> Result<String, StoreError> {
        let rules = self.category_rules().await?;
        Ok(rules.classify(model_id).to_string())
    }

    /// Fold a finished test run into the catalog: mark each probed model's
    /// availability and test time. Models missing from the catalog are added
    /// as custom entries so a probe of a hand-typed id is not lost.
    pub async fn record_results(&self, run: &TestRun) -> Result<(), StoreError> {
        if run.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut models = self.models().await?;
        for (model_id, result) in run.iter() {
            // cancelled probes say nothing about availability
            if result.cancelled {
                continue;
            }
            match models.iter_mut().find(|m| m.id == model_id) {
                Some(descriptor) => {
                    descriptor.available = Some(result.success);
                    descriptor.tested_at = Some(now);
                }
                None => {
                    let mut descriptor = ModelDescriptor::custom(model_id);
                    descriptor.available = Some(result.success);
                    descriptor.tested_at = Some(now);
                    models.push(descriptor);
                }
            }
        }

        self.replace_models(models).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_config::MemoryStore;
    use chatgate_types::ProbeResult;

    fn catalog() -> ModelCatalog {
        ModelCatalog::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn empty_store_yields_defaults() {
        let catalog = catalog();
        assert!(catalog.models().await.unwrap().is_empty());
        assert_eq!(catalog.classify("claude-3").await.unwrap(), "Claude");
    }

    #[tokio::test]
    async fn set_category_persists_and_reset_restores() {
        let catalog = catalog();
        catalog.set_category("Claude", "claude|sonnet").await.unwrap();
        assert_eq!(catalog.classify("sonnet-lite").await.unwrap(), "Claude");

        catalog.reset_categories().await.unwrap();
        assert_eq!(catalog.classify("sonnet-lite").await.unwrap(), "Other");
    }

    #[tokio::test]
    async fn record_results_updates_and_adds_models() {
        let catalog = catalog();
        catalog
            .replace_models(vec![ModelDescriptor::new("gpt-4")])
            .await
            .unwrap();

        let mut run = TestRun::new();
        run.insert("gpt-4", ProbeResult::success(120));
        run.insert("typo-model", ProbeResult::failure(80, "no such model", None));
        run.insert("halted", ProbeResult::cancelled(5));
        catalog.record_results(&run).await.unwrap();

        let models = catalog.models().await.unwrap();
        assert_eq!(models.len(), 2, "cancelled probe adds nothing");

        let known = models.iter().find(|m| m.id == "gpt-4").unwrap();
        assert_eq!(known.available, Some(true));
        assert!(!known.custom);

        let added = models.iter().find(|m| m.id == "typo-model").unwrap();
        assert_eq!(added.available, Some(false));
        assert!(added.custom);
    }
}
