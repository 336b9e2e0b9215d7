use async_trait::async_trait;
use common::GraphicVariantId;

use crate::Result;

/// Trait for the platform inventory operations the sync core depends on.
#[async_trait]
pub trait CommerceClient: Send + Sync {
    /// Resolves the inventory item handle for a variant.
    async fn inventory_handle(&self, variant_id: &GraphicVariantId) -> Result<String>;

    /// Sets the available stock for an inventory handle at the configured
    /// location.
    async fn set_inventory_level(&self, inventory_handle: &str, available: i64) -> Result<()>;
}
