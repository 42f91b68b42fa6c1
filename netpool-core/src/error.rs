//! Types for working with errors produced by netpool.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::io;
use std::result::Result as StdResult;

/// A specialized `Result` type for netpool.
pub type Result<T, E = Error> = StdResult<T, E>;

// Convenience type alias for usage within netpool.
pub type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// Represents all the ways a method can fail within netpool.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The sizes given to [`PoolOptions`][crate::pool::PoolOptions] are not usable.
    ///
    /// `max_size` must be greater than zero and `initial_size` may not exceed it.
    #[error("invalid pool configuration: {0}")]
    Configuration(Cow<'static, str>),

    /// The connector failed while the pool was opening its initial connections.
    ///
    /// Every connection opened before the failure has already been closed.
    #[error("connector is not able to fill the pool: {source}")]
    PoolFill {
        #[source]
        source: Box<Error>,
    },

    /// [`Pool::close`] was called before or during [`Pool::acquire`].
    ///
    /// [`Pool::acquire`]: crate::pool::Pool::acquire
    /// [`Pool::close`]: crate::pool::Pool::close
    #[error("attempted to acquire a connection on a closed pool")]
    PoolClosed,

    /// A connection was handed back to the pool after it had already been released.
    ///
    /// This indicates a bug in the code driving the pool, never a transient condition.
    #[error("connection is missing; it was already released to the pool")]
    ConnectionReleased,

    /// Error communicating with the remote end, while connecting or closing.
    #[error("error communicating with the server: {0}")]
    Io(#[from] io::Error),

    /// A connector failed with an error that is not an [`io::Error`].
    #[error("error occurred while opening a connection: {0}")]
    Connect(#[source] BoxDynError),
}

impl Error {
    /// Wrap an arbitrary connector error.
    #[inline]
    pub fn connect(err: impl StdError + Send + Sync + 'static) -> Self {
        Error::Connect(err.into())
    }

    #[inline]
    pub(crate) fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Configuration(message.into())
    }

    /// Returns `true` if this is [`Error::PoolClosed`].
    pub fn is_pool_closed(&self) -> bool {
        matches!(self, Error::PoolClosed)
    }
}
