pub mod object_store;
pub mod sql;

pub use object_store::ObjectStoreProvider;
pub use sql::SqlProvider;
