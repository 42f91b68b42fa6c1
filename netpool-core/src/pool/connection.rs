use std::fmt::{self, Debug, Formatter};
use std::io;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Instant;

use futures_core::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::inner::SharedPool;
use crate::connection::Connection;
use crate::error::Error;

/// A connection checked out from [`Pool`][crate::pool::Pool].
///
/// Derefs to the underlying connection, and forwards [`AsyncRead`] and [`AsyncWrite`] to it, so it
/// can be used exactly like the raw connection.
///
/// Closing it with [`Connection::close`] hands the connection back to the pool instead of tearing
/// down the transport, unless it was [marked unusable][Self::mark_unusable], the pool's idle buffer
/// is full, or the pool has been closed. Dropping it has the same effect, except that a connection
/// the pool cannot keep is dropped rather than closed.
pub struct PoolConnection<C: Connection> {
    live: Option<Live<C>>,
    pool: Weak<SharedPool<C>>,
    acquired_at: Instant,
    unusable: bool,
}

pub(super) struct Live<C> {
    raw: C,
    created_at: Instant,
}

pub(super) struct Idle<C> {
    live: Live<C>,
    pub(super) since: Instant,
}

const DEREF_ERR: &str = "(bug) connection already released to pool";

impl<C: Connection> PoolConnection<C> {
    pub(super) fn new(live: Live<C>, pool: &Arc<SharedPool<C>>) -> Self {
        Self {
            live: Some(live),
            pool: Arc::downgrade(pool),
            acquired_at: Instant::now(),
            unusable: false,
        }
    }

    /// Flag this connection so that closing it tears down the transport instead of returning it
    /// to the pool.
    ///
    /// Use this when the connection may be left in an unknown state, e.g. a read was abandoned
    /// halfway through a response. There is no way to undo it.
    pub fn mark_unusable(&mut self) {
        self.unusable = true;
    }

    /// Returns `true` if [`mark_unusable`][Self::mark_unusable] was called.
    pub fn is_unusable(&self) -> bool {
        self.unusable
    }

    /// When this connection was handed out by the pool.
    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// When the underlying connection was opened.
    ///
    /// Unlike [`acquired_at`][Self::acquired_at], this survives recycling through the pool.
    pub fn created_at(&self) -> Instant {
        self.live.as_ref().expect(DEREF_ERR).created_at
    }

    /// Detach this connection from the pool entirely.
    ///
    /// The pool will never see the connection again; closing it is up to the caller.
    pub fn detach(mut self) -> C {
        self.live.take().expect(DEREF_ERR).raw
    }
}

impl<C: Connection> Connection for PoolConnection<C> {
    /// Return the connection to the pool it was checked out from.
    ///
    /// If the connection was marked unusable, the buffer is full, or the pool has been closed or
    /// dropped, the connection is closed for real and the result of that close is returned.
    fn close(mut self) -> BoxFuture<'static, Result<(), Error>> {
        let live = self.live.take();
        let pool = self.pool.upgrade();
        let unusable = self.unusable;

        Box::pin(async move {
            match (pool, live) {
                (Some(pool), live) if !unusable => pool.release(live).await,
                (_, Some(live)) => live.close().await,
                (None, None) if !unusable => Err(Error::ConnectionReleased),
                (_, None) => Ok(()),
            }
        })
    }
}

/// Returns the connection to the [`Pool`][crate::pool::Pool] it was checked out from.
impl<C: Connection> Drop for PoolConnection<C> {
    fn drop(&mut self) {
        let Some(live) = self.live.take() else {
            return;
        };

        if self.unusable {
            tracing::trace!(target: "netpool::pool", "dropping unusable connection");
            return;
        }

        if let Some(pool) = self.pool.upgrade() {
            pool.release_on_drop(live);
        }
    }
}

impl<C: Connection> Deref for PoolConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.live.as_ref().expect(DEREF_ERR).raw
    }
}

impl<C: Connection> DerefMut for PoolConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.live.as_mut().expect(DEREF_ERR).raw
    }
}

impl<C: Connection + Debug> Debug for PoolConnection<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConnection")
            .field("raw", &self.live.as_ref().map(|live| &live.raw))
            .field("acquired_at", &self.acquired_at)
            .field("unusable", &self.unusable)
            .finish()
    }
}

impl<C> AsyncRead for PoolConnection<C>
where
    C: Connection + AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut **self.get_mut()).poll_read(cx, buf)
    }
}

impl<C> AsyncWrite for PoolConnection<C>
where
    C: Connection + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut **self.get_mut()).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut **self.get_mut()).poll_flush(cx)
    }

    // Shuts down the write half of the transport; this is not the pool-aware close.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut **self.get_mut()).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut **self.get_mut()).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        (**self).is_write_vectored()
    }
}

impl<C: Connection> Live<C> {
    pub fn new(raw: C) -> Self {
        Live {
            raw,
            created_at: Instant::now(),
        }
    }

    pub fn into_idle(self) -> Idle<C> {
        Idle {
            live: self,
            since: Instant::now(),
        }
    }

    pub async fn close(self) -> Result<(), Error> {
        self.raw.close().await
    }
}

impl<C> Idle<C> {
    pub fn into_live(self) -> Live<C> {
        self.live
    }
}
