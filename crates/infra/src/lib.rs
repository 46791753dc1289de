//! Infrastructure layer: lot storage, the transactional lot service,
//! authorization hooks and configuration.

pub mod authz;
pub mod config;
pub mod service;
pub mod store;


pub use authz::{AllowAll, AuthzError, LotAction, LotAuthorizer, PermissionTable};
pub use config::{ConfigError, LotkeeperConfig, StoreBackend};
pub use service::{LotReceipt, LotService, LotView, ServiceError};
pub use store::{InMemoryLotStore, LotStore, StoreError};

#[cfg(feature = "postgres")]
pub use store::postgres::{PostgresLotStore, connect_from_config};
