use crate::config::WarehouseConfig;
use duckdb::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Catalog name the warehouse is attached under; queries address `fleet.*`.
pub const WAREHOUSE_CATALOG: &str = "fleet";

/// Wraps an in-memory DuckDB instance with the warehouse attached read-only
/// as the `fleet` catalog. Each query runs on its own cloned connection, so
/// independent queries may proceed in parallel.
pub struct DuckDbConn {
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl DuckDbConn {
    /// Attach the configured warehouse file, either a DuckDB database or a
    /// SQLite database through `sqlite_scanner`.
    pub fn new(config: &WarehouseConfig) -> Result<Self, String> {
        let path = config
            .path
            .to_str()
            .ok_or_else(|| "invalid warehouse path".to_string())?;

        let conn = Connection::open_in_memory()
            .map_err(|e| format!("failed to open DuckDB in-memory: {e}"))?;

        let attach_sql = if config.attach_sqlite {
            // The home directory may not exist in containers, so INSTALL
            // needs a writable extension directory.
            let ext_dir = std::env::var("DUCKDB_EXTENSION_DIR").unwrap_or_else(|_| {
                std::env::temp_dir()
                    .join("duckdb_ext")
                    .to_string_lossy()
                    .into_owned()
            });
            conn.execute_batch(&format!(
                "SET extension_directory = '{}'",
                ext_dir.replace('\'', "''")
            ))
            .map_err(|e| format!("failed to set extension_directory: {e}"))?;
            conn.execute_batch("INSTALL sqlite_scanner; LOAD sqlite_scanner;")
                .map_err(|e| format!("failed to load sqlite_scanner: {e}"))?;
            format!(
                "ATTACH '{}' AS {WAREHOUSE_CATALOG} (TYPE SQLITE, READ_ONLY)",
                path.replace('\'', "''")
            )
        } else {
            format!(
                "ATTACH '{}' AS {WAREHOUSE_CATALOG} (READ_ONLY)",
                path.replace('\'', "''")
            )
        };
        conn.execute_batch(&attach_sql)
            .map_err(|e| format!("failed to attach warehouse: {e}"))?;

        tracing::info!(
            path = %config.path.display(),
            sqlite = config.attach_sqlite,
            "warehouse attached"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timeout: Duration::from_secs(config.query_timeout_secs),
        })
    }

    /// Writable in-memory `fleet` catalog, for tests and local seeding.
    pub fn in_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory()
            .map_err(|e| format!("failed to open DuckDB in-memory: {e}"))?;
        conn.execute_batch(&format!("ATTACH ':memory:' AS {WAREHOUSE_CATALOG}"))
            .map_err(|e| format!("failed to attach in-memory warehouse: {e}"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timeout: Duration::from_secs(30),
        })
    }

    /// Execute a query via `spawn_blocking` to avoid blocking the async runtime.
    /// The closure receives a `&Connection` and returns a result.
    pub async fn query<F, T>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Connection) -> Result<T, duckdb::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let timeout = self.timeout;
        tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || {
                let worker = conn
                    .blocking_lock()
                    .try_clone()
                    .map_err(|e| format!("failed to clone DuckDB connection: {e}"))?;
                f(&worker).map_err(|e| format!("DuckDB query error: {e}"))
            }),
        )
        .await
        .map_err(|_| format!("DuckDB query timed out after {}s", timeout.as_secs()))?
        .map_err(|e| format!("spawn_blocking join error: {e}"))?
    }
}
