//! `lotkeeper-core` — foundation building blocks shared by the lot domain and
//! its infrastructure.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod clock;
pub mod error;
pub mod id;
pub mod quantity;
pub mod version;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{IssueId, LotId, MaterialId, UserId, WarehouseId};
pub use quantity::Quantity;
pub use version::ExpectedVersion;
