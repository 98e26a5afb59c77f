pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryOrderStore, InMemoryTransaction};
pub use model::{
    CatalogEntry, NewOrder, NewOrderLine, Order, OrderLine, Product, ShippingInfo, Variant,
};
pub use postgres::{PgOrderTransaction, PostgresOrderStore};
pub use query::OrderQuery;
pub use store::{Catalog, OrderStore, OrderStoreExt, OrderTransaction};
