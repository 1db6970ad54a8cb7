use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A model known to the catalog, either built-in or user-added.
///
/// Serialized with camelCase names so the persisted JSON stays readable by the
/// browser client that originally owned this data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom: bool,
    /// Outcome of the most recent availability probe, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tested_at: Option<DateTime<Utc>>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            custom: false,
            available: None,
            tested_at: None,
        }
    }

    pub fn custom(id: impl Into<String>) -> Self {
        Self {
            custom: true,
            ..Self::new(id)
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
