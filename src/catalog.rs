use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::{ResourceId, TimeOfDay};

/// A bookable common area as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub name: String,
    /// Price per hour. `None` means the area is free of charge.
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default = "default_open")]
    pub open_time: TimeOfDay,
    #[serde(default = "default_close")]
    pub close_time: TimeOfDay,
    #[serde(default = "default_requires_approval")]
    pub requires_approval: bool,
}

fn default_open() -> TimeOfDay {
    TimeOfDay::MIDNIGHT
}

fn default_close() -> TimeOfDay {
    TimeOfDay::END_OF_DAY
}

fn default_requires_approval() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("reading catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("resource {id}: {reason}")]
    Invalid { id: ResourceId, reason: String },
}

/// Source of resource data for pricing and availability.
///
/// Reservations never own resource data; they look it up by id when needed.
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    async fn resource(&self, id: ResourceId) -> Option<ResourceInfo>;
}

/// In-memory catalog, optionally seeded from a JSON array of resources.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    resources: DashMap<ResourceId, ResourceInfo>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let entries: Vec<ResourceInfo> = serde_json::from_str(raw)?;
        let catalog = Self::new();
        for info in entries {
            catalog.upsert(info)?;
        }
        Ok(catalog)
    }

    /// Insert or replace a resource. Rates apply to approvals made after this call.
    pub fn upsert(&self, info: ResourceInfo) -> Result<(), CatalogError> {
        if let Some(rate) = info.hourly_rate
            && !(rate.is_finite() && rate >= 0.0)
        {
            return Err(CatalogError::Invalid {
                id: info.id,
                reason: format!("hourly rate must be a non-negative number, got {rate}"),
            });
        }
        if info.open_time > info.close_time {
            return Err(CatalogError::Invalid {
                id: info.id,
                reason: format!("opens at {} after closing at {}", info.open_time, info.close_time),
            });
        }
        self.resources.insert(info.id, info);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl ResourceCatalog for StaticCatalog {
    async fn resource(&self, id: ResourceId) -> Option<ResourceInfo> {
        self.resources.get(&id).map(|e| e.value().clone())
    }
}
