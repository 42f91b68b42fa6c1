use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use super::inner::SharedPool;
use super::Pool;
use crate::connection::Connector;
use crate::error::Error;

/// Configuration options for [`Pool`].
///
/// ### Defaults
/// | option         | default |
/// |----------------|---------|
/// | `initial_size` | 0       |
/// | `max_size`     | 10      |
#[derive(Clone)]
pub struct PoolOptions {
    initial_size: usize,
    max_size: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolOptions {
    /// Returns a default "sane" configuration.
    ///
    /// See the source of this method for the current default values.
    pub fn new() -> Self {
        Self {
            // don't open connections until necessary
            initial_size: 0,
            // keep at most 10 idle connections around
            max_size: 10,
        }
    }

    /// Set the number of connections opened when the pool is built.
    ///
    /// Must not exceed [`max_size`][Self::max_size].
    pub fn initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    /// Get the number of connections opened when the pool is built.
    pub fn get_initial_size(&self) -> usize {
        self.initial_size
    }

    /// Set the maximum number of idle connections the pool will hold on to.
    ///
    /// This bounds the idle buffer, not the number of connections checked out at once: when the
    /// buffer is empty [`Pool::acquire`] opens a new connection, and a connection released into a
    /// full buffer is closed instead.
    ///
    /// Must be greater than zero.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Get the maximum number of idle connections the pool will hold on to.
    pub fn get_max_size(&self) -> usize {
        self.max_size
    }

    fn validate(&self) -> Result<(), Error> {
        if self.max_size == 0 {
            return Err(Error::config("max_size must be greater than zero"));
        }

        if self.initial_size > self.max_size {
            return Err(Error::config(format!(
                "initial_size ({}) must not exceed max_size ({})",
                self.initial_size, self.max_size
            )));
        }

        Ok(())
    }

    /// Create a new pool from these options, opening `initial_size` connections with `connector`.
    ///
    /// If the connector fails while filling the pool, the connections opened so far are closed
    /// and [`Error::PoolFill`] is returned.
    pub async fn connect_with<X>(self, connector: X) -> Result<Pool<X::Connection>, Error>
    where
        X: Connector,
    {
        self.validate()?;

        let pool = Pool(SharedPool::new_arc(self.max_size, Arc::new(connector)));

        if let Err(error) = pool.0.fill(self.initial_size).await {
            pool.close().await;

            return Err(Error::PoolFill {
                source: Box::new(error),
            });
        }

        Ok(pool)
    }
}

impl Debug for PoolOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("initial_size", &self.initial_size)
            .field("max_size", &self.max_size)
            .finish()
    }
}
