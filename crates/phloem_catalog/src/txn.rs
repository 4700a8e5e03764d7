//! Transaction scopes and post-commit hooks.

use crate::error::{is_busy, CatalogError, Result, Retryable};
use crate::files::FileStore;
use crate::folders::FolderStore;
use crate::pool::Pool;
use crate::schema;
use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_CONNECTIONS: usize = 5;
const MAX_TXN_RETRIES: usize = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

type Hook = Box<dyn FnOnce() + Send>;

enum Attempt<T, E> {
    Done(Result<T, E>),
    Contended(rusqlite::Error),
    Retryable(E),
}

/// Handle to the catalog database. Cheap to clone; clones share one pool.
#[derive(Clone)]
pub struct Catalog {
    pool: Arc<Pool>,
}

impl Catalog {
    /// Open or create a catalog at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_connections(path, DEFAULT_CONNECTIONS)
    }

    /// Open with an explicit pool size. The pool bounds how many transactions
    /// can be in flight at once; sizing it to the scan parallelism avoids
    /// workers queueing on a checkout.
    pub fn open_with_connections(path: impl AsRef<Path>, connections: usize) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let count = connections.max(1);
        let mut pool = Vec::with_capacity(count);
        for i in 0..count {
            let conn = rusqlite::Connection::open(path)?;
            schema::configure_connection(&conn)?;
            if i == 0 {
                schema::ensure_schema(&conn)?;
            }
            pool.push(conn);
        }

        debug!(path = %path.display(), connections = count, "catalog opened");

        Ok(Self {
            pool: Arc::new(Pool::new(pool)),
        })
    }

    /// Run `body` inside a write transaction.
    ///
    /// The body MUST be idempotent modulo post-commit hooks: on lock
    /// contention the transaction is rolled back and the body re-executed
    /// against fresh state, with any registered hooks discarded. Hooks run
    /// exactly once, after the commit that succeeds.
    pub fn with_txn<T, E, F>(&self, mut body: F) -> Result<T, E>
    where
        F: FnMut(&TxnContext<'_>) -> Result<T, E>,
        E: From<CatalogError> + Retryable,
    {
        self.run_txn("BEGIN IMMEDIATE", &mut body)
    }

    /// Run `body` inside a read transaction, giving it a stable snapshot of
    /// the catalog.
    pub fn with_read_txn<T, E, F>(&self, mut body: F) -> Result<T, E>
    where
        F: FnMut(&TxnContext<'_>) -> Result<T, E>,
        E: From<CatalogError> + Retryable,
    {
        self.run_txn("BEGIN DEFERRED", &mut body)
    }

    /// Run `body` against a plain connection, outside any transaction.
    /// Post-commit hooks cannot be registered here.
    pub fn with_db<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&TxnContext<'_>) -> Result<T, E>,
        E: From<CatalogError>,
    {
        let conn = self.pool.get().map_err(E::from)?;
        let ctx = TxnContext {
            conn: &conn,
            hooks: None,
        };
        body(&ctx)
    }

    fn run_txn<T, E, F>(&self, begin: &str, body: &mut F) -> Result<T, E>
    where
        F: FnMut(&TxnContext<'_>) -> Result<T, E>,
        E: From<CatalogError> + Retryable,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt_txn(begin, body) {
                Attempt::Done(result) => return result,
                Attempt::Contended(e) if attempt >= MAX_TXN_RETRIES => {
                    return Err(CatalogError::RetryLimit(e).into());
                }
                Attempt::Retryable(e) if attempt >= MAX_TXN_RETRIES => return Err(e),
                Attempt::Contended(_) | Attempt::Retryable(_) => {
                    warn!(attempt, "catalog transaction contended, retrying");
                    std::thread::sleep(RETRY_BACKOFF * attempt as u32);
                }
            }
        }
    }

    fn attempt_txn<T, E, F>(&self, begin: &str, body: &mut F) -> Attempt<T, E>
    where
        F: FnMut(&TxnContext<'_>) -> Result<T, E>,
        E: From<CatalogError> + Retryable,
    {
        let conn = match self.pool.get() {
            Ok(conn) => conn,
            Err(e) => return Attempt::Done(Err(e.into())),
        };
        if let Err(e) = conn.execute_batch(begin) {
            if is_busy(&e) {
                return Attempt::Contended(e);
            }
            return Attempt::Done(Err(CatalogError::from(e).into()));
        }

        let ctx = TxnContext {
            conn: &conn,
            hooks: Some(RefCell::new(Vec::new())),
        };

        match body(&ctx) {
            Ok(value) => {
                let hooks = ctx.take_hooks();
                match conn.execute_batch("COMMIT") {
                    Ok(()) => {
                        for hook in hooks {
                            hook();
                        }
                        Attempt::Done(Ok(value))
                    }
                    Err(e) if is_busy(&e) => {
                        let _ = conn.execute_batch("ROLLBACK");
                        Attempt::Contended(e)
                    }
                    Err(e) => {
                        let _ = conn.execute_batch("ROLLBACK");
                        Attempt::Done(Err(CatalogError::from(e).into()))
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                let _ = conn.execute_batch("ROLLBACK");
                Attempt::Retryable(e)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Attempt::Done(Err(e))
            }
        }
    }
}

/// A scoped database context handed to transaction bodies.
pub struct TxnContext<'c> {
    conn: &'c rusqlite::Connection,
    // None when the context is a plain connection (`with_db`).
    hooks: Option<RefCell<Vec<Hook>>>,
}

impl<'c> TxnContext<'c> {
    pub fn folders(&self) -> FolderStore<'_> {
        FolderStore::new(self.conn)
    }

    pub fn files(&self) -> FileStore<'_> {
        FileStore::new(self.conn)
    }

    /// Register a side effect to run after a successful commit.
    ///
    /// Hooks are for effects that must not repeat when the transaction is
    /// retried, notably log lines.
    pub fn add_post_commit_hook(&self, hook: impl FnOnce() + Send + 'static) -> Result<()> {
        match &self.hooks {
            Some(hooks) => {
                hooks.borrow_mut().push(Box::new(hook));
                Ok(())
            }
            None => Err(CatalogError::NoActiveTransaction),
        }
    }

    fn take_hooks(&self) -> Vec<Hook> {
        match &self.hooks {
            Some(hooks) => std::mem::take(&mut *hooks.borrow_mut()),
            None => Vec::new(),
        }
    }
}
