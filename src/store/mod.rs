pub mod counter;
pub mod kv;
pub mod memory;
pub mod postgres;
pub mod tenant_store;

pub use tenant_store::TenantStore;
