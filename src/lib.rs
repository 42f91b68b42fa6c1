#![cfg_attr(docsrs, feature(doc_cfg))]
//! A bounded pool of reusable network connections.
//!
//! ```rust,no_run
//! use netpool::{Connection, Pool};
//! use tokio::io::AsyncWriteExt;
//! use tokio::net::TcpStream;
//!
//! # async fn example() -> netpool::Result<()> {
//! // keep up to 16 idle connections, opening 4 right away
//! let pool = Pool::connect(4, 16, || TcpStream::connect("127.0.0.1:11211")).await?;
//!
//! let mut conn = pool.acquire().await?;
//! conn.write_all(b"version\r\n").await?;
//!
//! // hands the connection back to the pool
//! conn.close().await?;
//!
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

// Modules
pub use netpool_core::{connection, error, pool};

// Types
pub use netpool_core::{
    BoxDynError, Connection, Connector, Error, Pool, PoolConnection, PoolOptions, Result,
};
