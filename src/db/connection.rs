//! SQLite access through a single worker thread.
//!
//! The connection never leaves the worker. Callers submit closures with
//! [`Database::execute`] and await the reply, so statements run one at a time in
//! submission order.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use crate::config::DatabaseConfig;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Owns the worker thread; stopping and joining it happens on drop.
struct Worker {
    jobs: mpsc::Sender<Message>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn spawn(db_path: PathBuf) -> Result<Self> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Message>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        let handle = thread::Builder::new()
            .name("usage-pipeline-db".into())
            .spawn(move || {
                let conn = match open_connection(&db_path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    error!("Database opener went away before the worker was ready");
                    return;
                }
                serve(conn, jobs_rx);
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        Ok(Self {
            jobs: jobs_tx,
            handle: Mutex::new(Some(handle)),
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        if let Err(err) = self.jobs.send(Message::Stop) {
            error!("Failed to stop database worker: {err}");
        }
        if let Err(err) = handle.join() {
            error!("Database worker panicked: {err:?}");
        }
    }
}

fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open SQLite database {}", db_path.display()))?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }
    Ok(conn)
}

fn serve(mut conn: Connection, jobs: mpsc::Receiver<Message>) {
    for message in jobs {
        match message {
            Message::Run(job) => job(&mut conn),
            Message::Stop => break,
        }
    }
    info!("Database worker stopped");
}

/// Cloneable handle to the SQLite store.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    /// Opens the store named by `config`. SQLite has no credentials, so the
    /// configured username and password are ignored.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if config.username.is_some() || config.password.is_some() {
            debug!("SQLite store ignores database username/password");
        }
        Self::new(config.path())
    }

    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let display = db_path.display().to_string();
        let worker = Worker::spawn(db_path)?;
        info!("Database opened at {display}");

        Ok(Self {
            worker: Arc::new(worker),
        })
    }

    /// Runs `task` on the worker thread and awaits its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let job: Job = Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                error!("Database caller dropped before receiving its result");
            }
        });

        self.worker
            .jobs
            .send(Message::Run(job))
            .map_err(|err| anyhow!("failed to submit job to database worker: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker terminated unexpectedly"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_one_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("store.sqlite3")).unwrap();
        let other = db.clone();

        db.execute(|conn| {
            conn.execute_batch(
                "CREATE TEMP TABLE scratch (n INTEGER); INSERT INTO scratch VALUES (7);",
            )?;
            Ok(())
        })
        .await
        .unwrap();

        // temp tables are private to a connection
        let n: i64 = other
            .execute(|conn| Ok(conn.query_row("SELECT n FROM scratch", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(n, 7);

        drop(db);
        drop(other);
        assert!(dir.path().join("nested").join("store.sqlite3").is_file());
    }

    #[tokio::test]
    async fn task_errors_reach_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("store.sqlite3")).unwrap();

        let err = db
            .execute(|conn| {
                conn.execute_batch("SELECT * FROM missing_table")?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("missing_table"));
    }
}
