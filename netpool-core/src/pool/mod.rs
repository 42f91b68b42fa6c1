//! Provides the connection pool for asynchronous network connections.
//!
//! Opening a connection is often the most expensive part of talking to a remote service: DNS
//! resolution, the TCP handshake and a TLS negotiation all happen before a single byte of the
//! actual protocol is exchanged. A connection pool amortizes that cost by keeping connections
//! that are no longer in use around and handing them to the next caller.
//!
//! [`Pool`] keeps a bounded, first-in first-out buffer of idle connections. [`Pool::acquire`]
//! takes the oldest idle connection, or opens a new one with the pool's [`Connector`] when the
//! buffer is empty. Acquiring never waits on other callers: the pool bounds how many idle
//! connections it *keeps*, not how many can be checked out at once.
//!
//! Connections are handed out as [`PoolConnection`], which behaves like the raw connection.
//! Closing it (through [`Connection::close`]) or dropping it returns the connection to the pool.
//! If the idle buffer is already full the connection is closed for real instead, so the pool
//! never grows past its configured `max_size`. A caller that suspects a connection is in a bad
//! state can call [`PoolConnection::mark_unusable`] before closing it, and the pool will never
//! hand that connection out again.
//!
//! [`Pool`] is `Send`, `Sync` and `Clone`. It is intended to be created once at the start of your
//! application/daemon/web server/etc. and then shared with all tasks throughout the process'
//! lifetime. How best to accomplish this depends on your program architecture.
//!
//! [`Connector`]: crate::connection::Connector
//! [`Connection::close`]: crate::connection::Connection::close

use std::fmt;
use std::sync::Arc;

use crate::connection::{Connection, Connector};
use crate::error::Error;

use self::inner::SharedPool;

pub use self::connection::PoolConnection;
pub use self::options::PoolOptions;

mod connection;
mod inner;
mod options;

/// An asynchronous pool of reusable network connections.
///
/// Create a pool with [`Pool::connect`] or [`PoolOptions::connect_with`] and then call
/// [`Pool::acquire`] to get a connection from the pool. When the connection is closed or dropped,
/// it is returned to the pool so it can be reused.
///
/// Cloning `Pool` is cheap as it is simply a reference-counted handle to the inner pool state.
/// When the last remaining handle to the pool is dropped, the idle connections are dropped with
/// it. Connections that are still checked out at that point are closed for real when released.
///
/// We recommend calling [`.close().await`] to shut down a pool instead of relying on `Drop`, as
/// it closes every idle connection explicitly.
///
/// [`.close().await`]: Pool::close
pub struct Pool<C: Connection>(pub(crate) Arc<SharedPool<C>>);

impl<C: Connection> Pool<C> {
    /// Create a new pool that keeps up to `max_size` idle connections, opening `initial_size` of
    /// them immediately with `connector`.
    ///
    /// Fails with [`Error::Configuration`] if `max_size` is zero or smaller than `initial_size`,
    /// and with [`Error::PoolFill`] if the connector fails while opening the initial connections.
    ///
    /// For more options, see [`PoolOptions`].
    pub async fn connect<X>(initial_size: usize, max_size: usize, connector: X) -> Result<Self, Error>
    where
        X: Connector<Connection = C>,
    {
        PoolOptions::new()
            .initial_size(initial_size)
            .max_size(max_size)
            .connect_with(connector)
            .await
    }

    /// Retrieves a connection from the pool.
    ///
    /// Returns the oldest idle connection if there is one. Otherwise a new connection is opened
    /// with the pool's connector, and any error it returns is passed through unchanged.
    ///
    /// Returns [`Error::PoolClosed`] if [`Pool::close`] has been called.
    pub async fn acquire(&self) -> Result<PoolConnection<C>, Error> {
        self.0.acquire().await
    }

    /// Attempts to retrieve an idle connection from the pool.
    ///
    /// Returns `None` immediately if there are no idle connections or the pool is closed. Never
    /// opens a new connection.
    pub fn try_acquire(&self) -> Option<PoolConnection<C>> {
        self.0.try_acquire()
    }

    /// Shut down the pool.
    ///
    /// Closes every idle connection and releases the connector. Afterwards [`Pool::acquire`]
    /// fails with [`Error::PoolClosed`], while connections that are still checked out can be
    /// closed as usual: they are closed for real instead of being returned.
    ///
    /// Only the first call does the work. Calls made while it is in progress wait for it to
    /// finish, and calls made afterwards return immediately.
    pub async fn close(&self) {
        self.0.close().await
    }

    /// Returns `true` if [`.close()`][Pool::close] has been called on the pool, `false` otherwise.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    /// Returns the number of idle connections currently held in the pool.
    ///
    /// Connections that are checked out are not counted.
    pub fn size(&self) -> usize {
        self.0.size()
    }

    /// Returns the maximum number of idle connections the pool will hold on to.
    pub fn max_size(&self) -> usize {
        self.0.max_size()
    }
}

/// Returns a new [Pool] tied to the same shared connection pool.
impl<C: Connection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<C: Connection> fmt::Debug for Pool<C> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Pool")
            .field("size", &self.0.size())
            .field("max_size", &self.0.max_size())
            .field("is_closed", &self.0.is_closed())
            .finish()
    }
}
