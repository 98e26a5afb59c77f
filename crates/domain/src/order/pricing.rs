use common::Money;
use order_store::CatalogEntry;

use super::OrderError;

/// Unit price a line is charged at.
///
/// An on-sale product with a discount takes the flat discount off the
/// variant's price; otherwise the variant's price applies unchanged. A
/// discount larger than the price is rejected, a resulting price of zero is
/// accepted.
pub fn unit_price(entry: &CatalogEntry) -> Result<Money, OrderError> {
    let price = entry.variant.price;

    match entry.product.discount {
        Some(discount) if entry.product.on_sale => {
            price
                .checked_sub(discount)
                .ok_or(OrderError::DiscountExceedsPrice {
                    variant_id: entry.variant.id,
                    price,
                    discount,
                })
        }
        _ => Ok(price),
    }
}
