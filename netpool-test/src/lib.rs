use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::future::BoxFuture;
use netpool::{Connection, Connector, Error};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

pub fn setup_if_needed() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Shared counters for every connection produced by one [`MockConnector`].
#[derive(Debug, Default)]
pub struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Counters {
    /// Number of connections the connector has produced.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of connections that were closed for real.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// An in-memory connection that records when it is really closed.
///
/// Reads and writes go to one end of a [`tokio::io::duplex`] pipe. The other end is kept by the
/// connection and reachable through [`MockConnection::peer`], standing in for the remote side.
#[derive(Debug)]
pub struct MockConnection {
    id: usize,
    stream: DuplexStream,
    peer: DuplexStream,
    counters: Arc<Counters>,
    fail_close: bool,
    close_delay: Option<Duration>,
}

impl MockConnection {
    /// The order in which this connection was opened, starting at zero.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Make the next real close report an error (the close is still counted).
    pub fn fail_close(&mut self) {
        self.fail_close = true;
    }

    /// The remote end of this connection's pipe.
    pub fn peer(&mut self) -> &mut DuplexStream {
        &mut self.peer
    }
}

impl Connection for MockConnection {
    fn close(self) -> BoxFuture<'static, Result<(), Error>> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);

        let result = if self.fail_close {
            Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock close failed",
            )))
        } else {
            Ok(())
        };

        let delay = self.close_delay;

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            result
        })
    }
}

impl AsyncRead for MockConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

/// A connector producing [`MockConnection`]s.
///
/// Can be told to fail on a given call, counting from one, and to make every real close slow.
#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    counters: Arc<Counters>,
    fail_on: Option<usize>,
    close_delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th invocation (1-based) with a connection-refused error.
    pub fn fail_on(mut self, call: usize) -> Self {
        self.fail_on = Some(call);
        self
    }

    /// Make each real close of a produced connection take `delay` (it is counted immediately).
    pub fn close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn connect(&self) -> BoxFuture<'_, Result<MockConnection, Error>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

            if self.fail_on == Some(call) {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "mock refused",
                )));
            }

            let id = self.counters.opened.fetch_add(1, Ordering::SeqCst);
            let (stream, peer) = tokio::io::duplex(1024);

            Ok(MockConnection {
                id,
                stream,
                peer,
                counters: Arc::clone(&self.counters),
                fail_close: false,
                close_delay: self.close_delay,
            })
        })
    }
}
