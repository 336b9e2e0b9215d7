//! In-memory commerce client for testing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::GraphicVariantId;

use crate::{CommerceError, Result, client::CommerceClient};

#[derive(Debug, Default)]
struct MockState {
    handles: HashMap<GraphicVariantId, String>,
    levels: HashMap<String, i64>,
    set_calls: HashMap<String, u32>,
    lookup_calls: HashMap<GraphicVariantId, u32>,
    /// Handles whose next N set calls answer 429.
    rate_limit_remaining: HashMap<String, u32>,
    /// Variants whose next N lookup calls answer 429.
    lookup_rate_limit_remaining: HashMap<GraphicVariantId, u32>,
    /// Handles whose set calls always fail.
    broken_handles: HashMap<String, String>,
}

/// In-memory commerce client with failure knobs for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommerceClient {
    state: Arc<RwLock<MockState>>,
}

impl InMemoryCommerceClient {
    /// Creates a new mock client with no known variants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a variant's inventory handle for lookups.
    pub fn register_handle(&self, variant_id: GraphicVariantId, handle: impl Into<String>) {
        self.state
            .write()
            .unwrap()
            .handles
            .insert(variant_id, handle.into());
    }

    /// Makes the next `times` set calls for a handle answer 429.
    pub fn rate_limit_next(&self, handle: impl Into<String>, times: u32) {
        self.state
            .write()
            .unwrap()
            .rate_limit_remaining
            .insert(handle.into(), times);
    }

    /// Makes the next `times` lookup calls for a variant answer 429.
    pub fn rate_limit_next_lookup(&self, variant_id: GraphicVariantId, times: u32) {
        self.state
            .write()
            .unwrap()
            .lookup_rate_limit_remaining
            .insert(variant_id, times);
    }

    /// Makes every set call for a handle fail with the given error text.
    pub fn break_handle(&self, handle: impl Into<String>, error: impl Into<String>) {
        self.state
            .write()
            .unwrap()
            .broken_handles
            .insert(handle.into(), error.into());
    }

    /// Returns the last level written for a handle.
    pub fn level(&self, handle: &str) -> Option<i64> {
        self.state.read().unwrap().levels.get(handle).copied()
    }

    /// Returns how many set calls were attempted for a handle.
    pub fn set_call_count(&self, handle: &str) -> u32 {
        self.state
            .read()
            .unwrap()
            .set_calls
            .get(handle)
            .copied()
            .unwrap_or(0)
    }

    /// Returns how many lookup calls were attempted for a variant.
    pub fn lookup_call_count(&self, variant_id: &GraphicVariantId) -> u32 {
        self.state
            .read()
            .unwrap()
            .lookup_calls
            .get(variant_id)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the total number of set calls across all handles.
    pub fn total_set_calls(&self) -> u32 {
        self.state.read().unwrap().set_calls.values().sum()
    }
}

#[async_trait]
impl CommerceClient for InMemoryCommerceClient {
    async fn inventory_handle(&self, variant_id: &GraphicVariantId) -> Result<String> {
        let mut state = self.state.write().unwrap();
        *state.lookup_calls.entry(variant_id.clone()).or_insert(0) += 1;

        if let Some(remaining) = state.lookup_rate_limit_remaining.get_mut(variant_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(CommerceError::RateLimited { retry_after: None });
        }

        state
            .handles
            .get(variant_id)
            .cloned()
            .ok_or_else(|| CommerceError::VariantNotFound(variant_id.clone()))
    }

    async fn set_inventory_level(&self, inventory_handle: &str, available: i64) -> Result<()> {
        let mut state = self.state.write().unwrap();
        *state
            .set_calls
            .entry(inventory_handle.to_string())
            .or_insert(0) += 1;

        if let Some(error) = state.broken_handles.get(inventory_handle) {
            return Err(CommerceError::Transient(error.clone()));
        }

        if let Some(remaining) = state.rate_limit_remaining.get_mut(inventory_handle)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(CommerceError::RateLimited { retry_after: None });
        }

        state
            .levels
            .insert(inventory_handle.to_string(), available);
        Ok(())
    }
}
