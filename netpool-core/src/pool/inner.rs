use std::mem;
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use event_listener::{listener, Event};
use parking_lot::Mutex;

use super::connection::{Idle, Live};
use super::PoolConnection;
use crate::connection::{Connection, Connector};
use crate::error::Error;

pub(crate) type DynConnector<C> = Arc<dyn Connector<Connection = C>>;

pub(crate) struct SharedPool<C: Connection> {
    state: Mutex<State<C>>,
    max_size: usize,
    on_closed: Event,
}

enum State<C: Connection> {
    Live {
        idle: ArrayQueue<Idle<C>>,
        connector: DynConnector<C>,
    },
    ShuttingDown {
        idle: ArrayQueue<Idle<C>>,
        /// Idle connections popped by a `close()` call that has not finished closing them yet.
        closing: usize,
    },
    Closed,
}

/// Outcome of looking for a connection under the state lock.
enum Checkout<C: Connection> {
    Idle(Idle<C>),
    Open(DynConnector<C>),
}

/// Next step of a `close()` call.
enum Drain<C: Connection> {
    Close(Idle<C>),
    /// The buffer is empty but other callers are still closing connections.
    Wait,
    /// This call finished the drain and must wake the waiters.
    Finished,
    Closed,
}

/// Accounts for one idle connection being closed by `close()`, even if that call is cancelled.
struct Closing<'a, C: Connection>(&'a SharedPool<C>);

impl<C: Connection> Drop for Closing<'_, C> {
    fn drop(&mut self) {
        if let State::ShuttingDown { closing, .. } = &mut *self.0.state.lock() {
            *closing -= 1;
        }

        self.0.on_closed.notify(usize::MAX);
    }
}

impl<C: Connection> SharedPool<C> {
    pub(super) fn new_arc(max_size: usize, connector: DynConnector<C>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Live {
                idle: ArrayQueue::new(max_size),
                connector,
            }),
            max_size,
            on_closed: Event::new(),
        })
    }

    pub(super) fn max_size(&self) -> usize {
        self.max_size
    }

    pub(super) fn size(&self) -> usize {
        match &*self.state.lock() {
            State::Live { idle, .. } => idle.len(),
            State::ShuttingDown { .. } | State::Closed => 0,
        }
    }

    /// `true` as soon as [`close`][Self::close] has begun, even while idle connections are still
    /// being drained.
    pub(super) fn is_closed(&self) -> bool {
        !matches!(&*self.state.lock(), State::Live { .. })
    }

    fn checkout(&self) -> Result<Checkout<C>, Error> {
        match &*self.state.lock() {
            State::Live { idle, connector } => Ok(match idle.pop() {
                Some(conn) => Checkout::Idle(conn),
                None => Checkout::Open(Arc::clone(connector)),
            }),
            State::ShuttingDown { .. } | State::Closed => Err(Error::PoolClosed),
        }
    }

    fn connector(&self) -> Result<DynConnector<C>, Error> {
        match &*self.state.lock() {
            State::Live { connector, .. } => Ok(Arc::clone(connector)),
            State::ShuttingDown { .. } | State::Closed => Err(Error::PoolClosed),
        }
    }

    pub(super) async fn acquire(self: &Arc<Self>) -> Result<PoolConnection<C>, Error> {
        let connector = match self.checkout()? {
            Checkout::Idle(idle) => {
                tracing::trace!(
                    target: "netpool::pool",
                    idle_for = ?idle.since.elapsed(),
                    "reusing idle connection"
                );

                return Ok(PoolConnection::new(idle.into_live(), self));
            }
            Checkout::Open(connector) => connector,
        };

        // The state lock is released here; a concurrent `close()` may complete while we connect.
        // The new connection is still handed out and is closed for real when released.
        let live = Live::new(connector.connect().await?);

        tracing::debug!(target: "netpool::pool", "opened new connection");

        Ok(PoolConnection::new(live, self))
    }

    pub(super) fn try_acquire(self: &Arc<Self>) -> Option<PoolConnection<C>> {
        match self.checkout() {
            Ok(Checkout::Idle(idle)) => Some(PoolConnection::new(idle.into_live(), self)),
            Ok(Checkout::Open(_)) | Err(_) => None,
        }
    }

    /// Open `count` connections and park them in the idle buffer.
    pub(super) async fn fill(&self, count: usize) -> Result<(), Error> {
        for _ in 0..count {
            let connector = self.connector()?;
            let live = Live::new(connector.connect().await?);

            if let Err(rejected) = self.try_push(live) {
                rejected.close().await?;
            }
        }

        tracing::debug!(target: "netpool::pool", count, "pool filled");

        Ok(())
    }

    /// Offer a connection to the idle buffer.
    ///
    /// Hands the connection back if the pool is no longer live or the buffer is full. Never blocks.
    fn try_push(&self, live: Live<C>) -> Result<(), Live<C>> {
        let state = self.state.lock();

        let idle = match &*state {
            State::Live { idle, .. } => idle,
            State::ShuttingDown { .. } | State::Closed => return Err(live),
        };

        idle.push(live.into_idle()).map_err(|rejected| {
            tracing::debug!(
                target: "netpool::pool",
                max_size = self.max_size,
                "idle buffer is full; discarding connection"
            );

            rejected.into_live()
        })
    }

    /// Return a connection to the pool, closing it for real if it cannot be kept.
    ///
    /// After `close()` this degrades to a plain close so that connections checked out before
    /// shutdown can still be released without error.
    pub(super) async fn release(&self, live: Option<Live<C>>) -> Result<(), Error> {
        let live = live.ok_or(Error::ConnectionReleased)?;

        match self.try_push(live) {
            Ok(()) => Ok(()),
            Err(rejected) => rejected.close().await,
        }
    }

    /// Synchronous variant of [`release`][Self::release] used when a connection is dropped.
    ///
    /// A connection that cannot be kept is dropped instead of closed.
    pub(super) fn release_on_drop(&self, live: Live<C>) {
        if let Err(rejected) = self.try_push(live) {
            tracing::trace!(target: "netpool::pool", "dropping connection that could not be pooled");
            drop(rejected);
        }
    }

    /// Take the next step of shutting the pool down.
    ///
    /// The first call moves the idle buffer out of `Live`; the buffer stays in `ShuttingDown` so a
    /// `close()` that is cancelled halfway leaves the rest of the drain to the next caller.
    fn next_drain(&self) -> Drain<C> {
        let mut state = self.state.lock();

        if matches!(*state, State::Live { .. }) {
            if let State::Live { idle, .. } = mem::replace(&mut *state, State::Closed) {
                *state = State::ShuttingDown { idle, closing: 0 };
            }
        }

        let State::ShuttingDown { idle, closing } = &mut *state else {
            return Drain::Closed;
        };

        if let Some(conn) = idle.pop() {
            *closing += 1;
            return Drain::Close(conn);
        }

        if *closing > 0 {
            return Drain::Wait;
        }

        *state = State::Closed;
        Drain::Finished
    }

    /// Shut the pool down, closing every idle connection for real.
    ///
    /// Concurrent callers share the drain and each returns only once it is complete. If a call is
    /// cancelled, the connection it was closing is dropped and any later call resumes the drain.
    pub(super) async fn close(&self) {
        loop {
            listener!(self.on_closed => drained);

            match self.next_drain() {
                Drain::Close(conn) => {
                    let _closing = Closing(self);

                    if let Err(error) = conn.into_live().close().await {
                        tracing::debug!(target: "netpool::pool", %error, "error closing idle connection");
                    }
                }
                Drain::Wait => drained.await,
                Drain::Finished => {
                    self.on_closed.notify(usize::MAX);
                    tracing::debug!(target: "netpool::pool", "pool closed");
                    return;
                }
                Drain::Closed => return,
            }
        }
    }
}
