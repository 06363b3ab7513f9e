use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use beneficiary_core::normalize_name;
use tracing::info;

use super::{StaticMapping, StaticMappingStore, StoreError};

/// Pre-vetted mappings keyed by normalized brand
#[derive(Debug, Clone, Default)]
pub struct JsonStaticMappings {
    mappings: HashMap<String, StaticMapping>,
}

impl JsonStaticMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, mapping: StaticMapping) -> Self {
        self.insert(mapping);
        self
    }

    pub fn insert(&mut self, mapping: StaticMapping) {
        self.mappings.insert(normalize_name(&mapping.brand), mapping);
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Parse a JSON array of mappings
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let list: Vec<StaticMapping> = serde_json::from_str(json)?;
        Ok(list.into_iter().fold(Self::new(), Self::with_mapping))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StoreError::Io(format!("Failed to read {:?}: {}", path.as_ref(), e))
        })?;
        let mappings = Self::from_json(&json)?;
        info!("Loaded {} static brand mappings", mappings.len());
        Ok(mappings)
    }
}

#[async_trait]
impl StaticMappingStore for JsonStaticMappings {
    async fn lookup(&self, brand: &str) -> Result<Option<StaticMapping>, StoreError> {
        Ok(self.mappings.get(&normalize_name(brand)).cloned())
    }
}
