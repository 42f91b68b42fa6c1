use std::future::Future;

use futures_core::future::BoxFuture;
use tokio::io::AsyncWriteExt;

use crate::error::Error;

/// A single live connection that can be pooled.
///
/// The pool never reads from or writes to a connection; the only thing it needs to know is how to
/// close one for real when the connection is discarded.
pub trait Connection: 'static + Send + Sized {
    /// Explicitly close this connection, tearing down the underlying transport.
    ///
    /// Called by the pool when a connection is discarded: it was marked unusable, the idle buffer
    /// was full, or the pool has been closed. Any error is reported to whoever triggered the
    /// discard.
    fn close(self) -> BoxFuture<'static, Result<(), Error>>;
}

impl Connection for tokio::net::TcpStream {
    fn close(mut self) -> BoxFuture<'static, Result<(), Error>> {
        Box::pin(async move {
            self.shutdown().await?;
            Ok(())
        })
    }
}

#[cfg(unix)]
impl Connection for tokio::net::UnixStream {
    fn close(mut self) -> BoxFuture<'static, Result<(), Error>> {
        Box::pin(async move {
            self.shutdown().await?;
            Ok(())
        })
    }
}

/// Opens new connections on behalf of a [`Pool`][crate::pool::Pool].
///
/// This is implemented for any closure returning a future that resolves to
/// `Result<C, E>` where `C: Connection` and `E` converts into [`Error`] (which includes
/// [`std::io::Error`]), so dialing a TCP peer is simply:
///
/// ```rust,no_run
/// # async fn example() -> netpool_core::Result<()> {
/// use netpool_core::pool::Pool;
/// use tokio::net::TcpStream;
///
/// let pool = Pool::connect(2, 8, || TcpStream::connect("127.0.0.1:6379")).await?;
/// # Ok(())
/// # }
/// ```
///
/// The pool never inspects what a connector does; it only awaits it and checks the result.
/// Any retrying or timeout belongs inside the connector.
pub trait Connector: 'static + Send + Sync {
    type Connection: Connection;

    /// Produce one live, ready-to-use connection.
    fn connect(&self) -> BoxFuture<'_, Result<Self::Connection, Error>>;
}

impl<F, Fut, C, E> Connector for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, E>> + Send + 'static,
    C: Connection,
    E: Into<Error>,
{
    type Connection = C;

    fn connect(&self) -> BoxFuture<'_, Result<C, Error>> {
        let connecting = self();
        Box::pin(async move { connecting.await.map_err(Into::<Error>::into) })
    }
}
