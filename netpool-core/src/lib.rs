//! Core of netpool, a bounded pool of reusable network connections.
//!
//! This crate is not intended to be used directly; depend on `netpool` instead.
#![warn(future_incompatible, rust_2018_idioms)]

pub mod connection;
pub mod error;
pub mod pool;

#[doc(inline)]
pub use self::{
    connection::{Connection, Connector},
    error::{BoxDynError, Error, Result},
    pool::{Pool, PoolConnection, PoolOptions},
};
