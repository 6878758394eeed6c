use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use swarm_domain::error::{Error, Result};

/// One row of the shared peer registry (`spec.md` §6.2).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub port: u16,
    pub url: String,
    pub status: String,
    pub last_seen: f64,
}

/// `nodes(port INTEGER PRIMARY KEY, url TEXT, status TEXT, last_seen REAL)`.
///
/// Concurrent-write tolerant by design: `port` is the primary key and every
/// write is `INSERT OR REPLACE`, so the registry is last-write-wins and
/// eventually consistent (`spec.md` §5, §9) — there is no distributed
/// consensus here, deliberately.
pub struct NodeRegistry {
    conn: Mutex<Connection>,
}

impl NodeRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nodes (
                port INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                status TEXT NOT NULL,
                last_seen REAL NOT NULL
            );",
        )
        .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        Ok(NodeRegistry { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Self-register on startup. `INSERT OR REPLACE` makes repeated
    /// startups on the same port produce exactly one row (idempotent,
    /// `spec.md` §8).
    pub fn register(&self, port: u16, url: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO nodes (port, url, status, last_seen) VALUES (?1, ?2, 'active', ?3)",
            params![port, url, now_secs()],
        )
        .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        swarm_domain::trace::TraceEvent::RegistrySelfRegistered { port }.emit();
        Ok(())
    }

    /// Deregister on graceful shutdown.
    pub fn deregister(&self, port: u16) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM nodes WHERE port = ?1", params![port])
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Refresh `last_seen` for `port` (periodic heartbeat).
    pub fn heartbeat(&self, port: u16) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE nodes SET last_seen = ?1 WHERE port = ?2",
            params![now_secs(), port],
        )
        .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        Ok(())
    }

    /// `SELECT ... WHERE status='active'`, excluding `self_port` (self
    /// exclusion is the dispatcher's job, but exposing it here too keeps
    /// every caller's invariant check trivial, per `spec.md` §8's
    /// `target_port != current_node_port` property).
    pub fn active_peers(&self, self_port: u16) -> Result<Vec<NodeRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT port, url, status, last_seen FROM nodes WHERE status = 'active' AND port != ?1")
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![self_port], |r| {
                Ok(NodeRecord {
                    port: r.get(0)?,
                    url: r.get(1)?,
                    status: r.get(2)?,
                    last_seen: r.get(3)?,
                })
            })
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| Error::RegistryUnavailable(e.to_string()))?);
        }
        Ok(out)
    }

    pub fn get(&self, port: u16) -> Result<Option<NodeRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT port, url, status, last_seen FROM nodes WHERE port = ?1",
                params![port],
                |r| {
                    Ok(NodeRecord {
                        port: r.get(0)?,
                        url: r.get(1)?,
                        status: r.get(2)?,
                        last_seen: r.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        Ok(record)
    }

    /// Prune a peer observed to be unreachable (self-healing, `spec.md`
    /// §4.5 step 5, §8). Idempotent: pruning an already-absent port is a
    /// no-op, not an error.
    pub fn prune(&self, port: u16) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM nodes WHERE port = ?1", params![port])
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        swarm_domain::trace::TraceEvent::PeerPruned { port }.emit();
        Ok(())
    }

    /// Drop rows whose `last_seen` is older than `stale_after_secs`.
    /// Periodic background sweep; distinct from dispatcher-driven prune on
    /// observed connection failure.
    pub fn prune_stale(&self, stale_after_secs: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let cutoff = now_secs() - stale_after_secs as f64;
        let affected = conn
            .execute("DELETE FROM nodes WHERE last_seen < ?1", params![cutoff])
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        Ok(affected)
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_per_port() {
        let registry = NodeRegistry::open_in_memory().unwrap();
        registry.register(8000, "http://localhost:8000").unwrap();
        registry.register(8000, "http://localhost:8000").unwrap();
        let peers = registry.active_peers(9999).unwrap();
        assert_eq!(peers.len(), 1);
    }

    #[test]
    fn active_peers_excludes_self_port() {
        let registry = NodeRegistry::open_in_memory().unwrap();
        registry.register(8000, "http://localhost:8000").unwrap();
        registry.register(8001, "http://localhost:8001").unwrap();
        let peers = registry.active_peers(8000).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].port, 8001);
    }

    #[test]
    fn prune_removes_a_row_and_is_idempotent() {
        let registry = NodeRegistry::open_in_memory().unwrap();
        registry.register(8001, "http://localhost:8001").unwrap();
        registry.prune(8001).unwrap();
        registry.prune(8001).unwrap(); // no-op, must not error
        assert!(registry.get(8001).unwrap().is_none());
    }

    #[test]
    fn deregister_on_shutdown_removes_row() {
        let registry = NodeRegistry::open_in_memory().unwrap();
        registry.register(8000, "http://localhost:8000").unwrap();
        registry.deregister(8000).unwrap();
        assert!(registry.get(8000).unwrap().is_none());
    }

    #[test]
    fn prune_stale_removes_only_old_rows() {
        let registry = NodeRegistry::open_in_memory().unwrap();
        registry.register(8000, "http://localhost:8000").unwrap();
        {
            let conn = registry.conn.lock();
            conn.execute("UPDATE nodes SET last_seen = 0 WHERE port = 8000", []).unwrap();
        }
        registry.register(8001, "http://localhost:8001").unwrap();
        let removed = registry.prune_stale(60).unwrap();
        assert_eq!(removed, 1);
        assert!(registry.get(8000).unwrap().is_none());
        assert!(registry.get(8001).unwrap().is_some());
    }
}
