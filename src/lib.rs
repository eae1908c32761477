//! Embedded identity store: users, roles, permissions, API keys, OIDC
//! clients, and email verification tokens behind a transactional storage
//! abstraction.
//!
//! Open a backend from a connection descriptor with [`store::open`], then
//! use the [`Store`] wrappers for single-operation transactions or
//! [`Store::begin`] to group operations into one unit of work.

pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use config::{Environment, StoreConfig};
pub use error::Error;
pub use store::{open, Ident, Store, Transaction, TxOptions};
