//! A small fixed-size connection pool.
//!
//! Every worker thread runs its own transactions, so the pool hands out
//! whole connections; a checkout blocks until one is free. Connections are
//! opened eagerly so that pragma or schema failures surface at open time.

use crate::error::Result;
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};

pub(crate) struct Pool {
    connections: Mutex<Vec<Connection>>,
    available: Condvar,
}

impl Pool {
    pub(crate) fn new(connections: Vec<Connection>) -> Self {
        Self {
            connections: Mutex::new(connections),
            available: Condvar::new(),
        }
    }

    pub(crate) fn get(&self) -> Result<PooledConnection<'_>> {
        let mut guard = self
            .connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        loop {
            if let Some(conn) = guard.pop() {
                return Ok(PooledConnection {
                    pool: self,
                    conn: Some(conn),
                });
            }
            guard = self
                .available
                .wait(guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn put_back(&self, conn: Connection) {
        let mut guard = self
            .connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.push(conn);
        self.available.notify_one();
    }
}

pub(crate) struct PooledConnection<'p> {
    pool: &'p Pool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection checked out")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection checked out")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}
