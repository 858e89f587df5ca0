pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod service;
pub mod store;

pub use catalog::{Catalog, StaticCatalog};
pub use config::Config;
pub use error::{Error, Result};
pub use service::{AdmissionController, LeaseReaper, ReleaseHandler};
pub use store::{KeyBuilder, LeaseStore, MemoryLeaseStore, RedisLeaseStore};
