//! Read-only lookup from graphic variants to blank variants and back.

use std::sync::Arc;

use common::{BlankVariantKey, GraphicVariantId};
use store::{AssociationStore, GraphicAssociation};

use crate::Result;

/// Resolves graphic variants to their backing blank variant, and a blank
/// variant to its full set of sibling graphic variants.
#[derive(Clone)]
pub struct MappingResolver {
    associations: Arc<dyn AssociationStore>,
}

impl MappingResolver {
    pub fn new(associations: Arc<dyn AssociationStore>) -> Self {
        Self { associations }
    }

    /// Looks up a variant's association. `None` means the variant is not
    /// blank-backed — an expected outcome, not an error.
    pub async fn resolve(&self, variant_id: &GraphicVariantId) -> Result<Option<GraphicAssociation>> {
        Ok(self.associations.get(variant_id).await?)
    }

    /// Returns the fan-out target set for a blank variant, including the
    /// originating variant.
    pub async fn siblings(&self, key: &BlankVariantKey) -> Result<Vec<GraphicAssociation>> {
        Ok(self.associations.siblings(key).await?)
    }
}
