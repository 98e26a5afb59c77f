use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identifier.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the identifier only if it is a usable (positive) value.
            ///
            /// Transport layers hand over zero or negative values when the
            /// caller omitted the identifier, so those map to `None`.
            pub fn from_raw(raw: i64) -> Option<Self> {
                (raw > 0).then_some(Self(raw))
            }

            /// Returns the underlying integer.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

define_id!(
    /// Identifier of an authenticated storefront user.
    UserId
);
define_id!(
    /// Identifier of a placed order.
    OrderId
);
define_id!(
    /// Identifier of a single line within an order.
    OrderLineId
);
define_id!(
    /// Identifier of a purchasable variant (SKU).
    VariantId
);
define_id!(
    /// Identifier of the product a variant belongs to.
    ProductId
);
define_id!(
    /// Identifier of a coupon attached to an order.
    CouponId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_non_positive_values() {
        assert_eq!(OrderId::from_raw(0), None);
        assert_eq!(OrderId::from_raw(-4), None);
        assert_eq!(OrderId::from_raw(7), Some(OrderId::new(7)));
    }

    #[test]
    fn ids_parse_from_metadata_strings() {
        let id: UserId = " 42 ".parse().unwrap();
        assert_eq!(id.as_i64(), 42);
        assert!("forty-two".parse::<UserId>().is_err());
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&VariantId::new(9)).unwrap();
        assert_eq!(json, "9");
    }
}
