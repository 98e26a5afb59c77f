use common::VariantId;
use order_store::{CatalogEntry, Order};
use serde::Serialize;

/// An order enriched with the current catalog data of its lines' variants.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    /// Catalog entries for the variants referenced by the lines. A variant
    /// removed from the catalog since the order was placed is absent.
    pub variants: Vec<CatalogEntry>,
}

impl OrderDetails {
    pub(crate) fn new(order: Order, catalog: &[CatalogEntry]) -> Self {
        let mut variants: Vec<CatalogEntry> = Vec::new();
        for line in order.lines() {
            if variants.iter().any(|e| e.variant.id == line.variant_id()) {
                continue;
            }
            if let Some(entry) = catalog.iter().find(|e| e.variant.id == line.variant_id()) {
                variants.push(entry.clone());
            }
        }

        Self { order, variants }
    }

    /// Returns the catalog entry of a line's variant, if it still exists.
    pub fn variant(&self, variant_id: VariantId) -> Option<&CatalogEntry> {
        self.variants.iter().find(|e| e.variant.id == variant_id)
    }
}
