//! Label identity registry.

use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;

/// Write-through cache mapping sensor labels to their stable row ids.
///
/// The label set is a small closed set of physical sensors, so the cache is
/// unbounded and never evicted. Labels are created on first use and never
/// deleted; truncation leaves them in place even when all their readings
/// are gone.
pub struct LabelRegistry {
    cache: Mutex<HashMap<String, i64>>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `label` to its id, inserting the row on first use.
    ///
    /// Takes the live connection so the check-then-insert runs inside the
    /// connection manager's critical section; two callers racing on an
    /// unseen label would otherwise both insert it.
    pub fn get_or_create(&self, conn: &Connection, label: &str) -> rusqlite::Result<i64> {
        let mut cache = self.cache.lock().unwrap();

        if let Some(&id) = cache.get(label) {
            return Ok(id);
        }

        let existing: Option<i64> = conn
            .query_row(
                "SELECT label_id FROM labels WHERE label = ?1",
                [label],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => id,
            None => {
                conn.execute("INSERT INTO labels(label) VALUES (?1)", [label])?;
                let id = conn.last_insert_rowid();
                log::debug!("Created new label '{}' with id {}", label, id);
                id
            }
        };

        cache.insert(label.to_string(), id);
        Ok(id)
    }
}

impl Default for LabelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::store::ConnectionManager;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_manager(dir: &tempfile::TempDir) -> ConnectionManager {
        let cfg = HubConfig {
            db_path: dir.path().join("readings.db").to_str().unwrap().to_string(),
            ..HubConfig::default()
        };
        let manager = ConnectionManager::new(&cfg).unwrap();
        manager.setup().unwrap();
        manager
    }

    #[test]
    fn test_same_label_same_id() {
        let dir = tempdir().unwrap();
        let manager = test_manager(&dir);
        let registry = LabelRegistry::new();

        let first = manager
            .with_conn(|conn| registry.get_or_create(conn, "efergy_h2_123456"))
            .unwrap();
        let second = manager
            .with_conn(|conn| registry.get_or_create(conn, "efergy_h2_123456"))
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_labels_distinct_ids() {
        let dir = tempdir().unwrap();
        let manager = test_manager(&dir);
        let registry = LabelRegistry::new();

        let a = manager
            .with_conn(|conn| registry.get_or_create(conn, "efergy_h2_1"))
            .unwrap();
        let b = manager
            .with_conn(|conn| registry.get_or_create(conn, "efergy_h2_2"))
            .unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_cold_cache_resolves_existing_row() {
        let dir = tempdir().unwrap();
        let manager = test_manager(&dir);

        let id = manager
            .with_conn(|conn| LabelRegistry::new().get_or_create(conn, "efergy_h3_9"))
            .unwrap();

        // A fresh registry (empty cache) must find the same row, not insert
        // a duplicate.
        let fresh = LabelRegistry::new();
        let resolved = manager
            .with_conn(|conn| fresh.get_or_create(conn, "efergy_h3_9"))
            .unwrap();
        assert_eq!(id, resolved);

        let count: i64 = manager
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM labels WHERE label = 'efergy_h3_9'",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_concurrent_get_or_create_is_stable() {
        let dir = tempdir().unwrap();
        let manager = test_manager(&dir);
        let registry = Arc::new(LabelRegistry::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                manager
                    .with_conn(|conn| registry.get_or_create(conn, "efergy_h1_v1.0.1_548338"))
                    .unwrap()
            }));
        }

        let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]), "ids diverged: {ids:?}");

        let count: i64 = manager
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM labels", [], |row| row.get(0)))
            .unwrap();
        assert_eq!(count, 1);
    }
}
