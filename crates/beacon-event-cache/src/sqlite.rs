//! SQLite-backed event cache.

use crate::{migrations, CacheError, CacheResult, Event, EventCache, Fingerprint};
use beacon_config_and_utils::Paths;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long a second opener waits for the database lock before giving up.
const LOCK_WAIT: Duration = Duration::from_millis(250);

/// Event cache stored in a single SQLite file.
///
/// The connection holds an exclusive lock on the file for as long as the cache
/// is open, so a second cache opened on the same path fails to initialize and
/// reports `ready() == false`. Give each concurrently running client its own
/// path.
pub struct SqliteEventCache {
    conn: Mutex<Option<Connection>>,
    location: String,
}

impl SqliteEventCache {
    /// Open the cache at `path`, or at [`Paths::default_cache_file`] when `None`.
    ///
    /// The directory of an explicit path must already exist. Failures are
    /// logged and leave the cache permanently not ready.
    pub fn open(path: Option<&Path>) -> Self {
        let resolved = match path {
            Some(path) => Ok(path.to_path_buf()),
            None => default_location(),
        };

        let path = match resolved {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Cannot resolve default cache location");
                return Self::not_ready("<unresolved>".to_string());
            }
        };
        let location = path.to_string_lossy().to_string();

        match open_file(&path) {
            Ok(conn) => {
                info!(path = %location, "Opened event cache");
                Self {
                    conn: Mutex::new(Some(conn)),
                    location,
                }
            }
            Err(e) => {
                error!(
                    path = %location,
                    error = %e,
                    "Cannot open event cache; is it already open in another process?"
                );
                Self::not_ready(location)
            }
        }
    }

    /// Open a private in-memory cache, mainly for tests.
    pub fn open_in_memory() -> Self {
        let opened = Connection::open_in_memory()
            .map_err(CacheError::from)
            .and_then(|conn| {
                migrations::run_migrations(&conn)?;
                Ok(conn)
            });

        match opened {
            Ok(conn) => Self {
                conn: Mutex::new(Some(conn)),
                location: ":memory:".to_string(),
            },
            Err(e) => {
                error!(error = %e, "Cannot open in-memory event cache");
                Self::not_ready(":memory:".to_string())
            }
        }
    }

    fn not_ready(location: String) -> Self {
        Self {
            conn: Mutex::new(None),
            location,
        }
    }

    /// Where the cache lives.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Attempts recorded for the event, `None` if it is not cached.
    pub fn attempts(&self, event: &Event) -> Option<u32> {
        let key = Fingerprint::of(event);
        self.with_conn("attempts", |conn| {
            let attempts = conn
                .query_row(
                    "SELECT attempts FROM cache WHERE data = ?1",
                    params![key.as_str()],
                    |row| row.get::<_, u32>(0),
                )
                .optional()?;
            Ok(attempts)
        })
        .flatten()
    }

    /// Run `f` against the open connection.
    ///
    /// Returns `None` when the cache is closed or `f` fails; failures are logged.
    fn with_conn<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Connection) -> CacheResult<T>,
    ) -> Option<T> {
        let guard = self.conn.lock();
        let Some(conn) = guard.as_ref() else {
            debug!(operation, "Event cache not ready");
            return None;
        };

        match f(conn) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(
                    operation,
                    path = %self.location,
                    error = %e,
                    "Event cache operation failed"
                );
                None
            }
        }
    }
}

impl EventCache for SqliteEventCache {
    fn write(&self, event: &Event) -> bool {
        let key = Fingerprint::of(event);
        self.with_conn("write", |conn| {
            let changed = conn.execute(
                "INSERT INTO cache (data, attempts) VALUES (?1, 1)
                 ON CONFLICT(data) DO UPDATE SET attempts = attempts + 1",
                params![key.as_str()],
            )?;
            Ok(changed > 0)
        })
        .unwrap_or(false)
    }

    fn remove(&self, event: &Event) -> bool {
        let key = Fingerprint::of(event);
        self.with_conn("remove", |conn| {
            let deleted = conn.execute("DELETE FROM cache WHERE data = ?1", params![key.as_str()])?;
            Ok(deleted > 0)
        })
        .unwrap_or(false)
    }

    fn exists(&self, event: &Event) -> bool {
        let key = Fingerprint::of(event);
        self.with_conn("exists", |conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM cache WHERE data = ?1)",
                params![key.as_str()],
                |row| row.get(0),
            )?;
            Ok(found)
        })
        .unwrap_or(false)
    }

    fn read(&self, count: usize, max_attempts: u32) -> Vec<Event> {
        if count == 0 {
            return Vec::new();
        }
        let limit = i64::try_from(count).unwrap_or(i64::MAX);

        self.with_conn("read", |conn| {
            let mut stmt = conn.prepare(
                "SELECT data FROM cache
                 WHERE ?1 = 0 OR attempts < ?1
                 ORDER BY RANDOM()
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(params![max_attempts, limit], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let events = rows
                .into_iter()
                .filter_map(|data| {
                    let event = Fingerprint::from_stored(data.as_str()).to_event();
                    if event.is_none() {
                        warn!(data = %data, "Skipping unparsable cache entry");
                    }
                    event
                })
                .collect();
            Ok(events)
        })
        .unwrap_or_default()
    }

    fn ready(&self) -> bool {
        self.conn.lock().is_some()
    }

    fn close(&self) {
        let Some(conn) = self.conn.lock().take() else {
            return;
        };

        match conn.close() {
            Ok(()) => info!(path = %self.location, "Closed event cache"),
            Err((_, e)) => warn!(path = %self.location, error = %e, "Event cache close failed"),
        }
    }

    fn pending_count(&self) -> usize {
        self.with_conn("pending_count", |conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .unwrap_or(0)
    }
}

fn default_location() -> CacheResult<PathBuf> {
    let paths = Paths::new().map_err(|e| CacheError::InvalidData(e.to_string()))?;
    paths
        .ensure_dirs()
        .map_err(|e| CacheError::InvalidData(e.to_string()))?;

    let path = paths.default_cache_file();
    warn!(
        path = %path.display(),
        "Using the default event cache; a second client on this path will fail to open it"
    );
    Ok(path)
}

fn open_file(path: &Path) -> CacheResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("cache directory does not exist: {}", parent.display()),
            )));
        }
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(LOCK_WAIT)?;

    // Hold the file lock for the lifetime of the connection.
    conn.execute_batch(
        "
        PRAGMA locking_mode = EXCLUSIVE;
        PRAGMA synchronous = FULL;
        BEGIN EXCLUSIVE;
        COMMIT;
        ",
    )?;

    migrations::run_migrations(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn event(n: usize) -> Event {
        Event::new("clicks", format!(r#"{{"n":{n}}}"#))
    }

    #[test]
    fn in_memory_cache_is_ready() {
        let cache = SqliteEventCache::open_in_memory();
        assert!(cache.ready());
        assert_eq!(cache.pending_count(), 0);
        assert_eq!(cache.location(), ":memory:");
    }

    #[test]
    fn write_inserts_with_one_attempt() {
        let cache = SqliteEventCache::open_in_memory();
        let e = event(1);

        assert!(cache.write(&e));
        assert!(cache.exists(&e));
        assert_eq!(cache.attempts(&e), Some(1));
    }

    #[test]
    fn write_twice_bumps_single_row() {
        let cache = SqliteEventCache::open_in_memory();
        let e = event(1);

        assert!(cache.write(&e));
        assert!(cache.write(&e));

        assert_eq!(cache.pending_count(), 1);
        assert_eq!(cache.attempts(&e), Some(2));
    }

    #[test]
    fn remove_is_idempotent() {
        let cache = SqliteEventCache::open_in_memory();
        let e = event(1);

        assert!(!cache.remove(&e));

        cache.write(&e);
        assert!(cache.remove(&e));
        assert!(!cache.remove(&e));
        assert!(!cache.exists(&e));
    }

    #[test]
    fn read_returns_reconstructed_events() {
        let cache = SqliteEventCache::open_in_memory();
        for n in 0..5 {
            cache.write(&event(n));
        }

        let mut batch = cache.read(10, 0);
        batch.sort_by(|a, b| a.payload().cmp(b.payload()));
        let expected: Vec<Event> = (0..5).map(event).collect();
        assert_eq!(batch, expected);
    }

    #[test]
    fn read_respects_count() {
        let cache = SqliteEventCache::open_in_memory();
        for n in 0..20 {
            cache.write(&event(n));
        }

        assert_eq!(cache.read(7, 0).len(), 7);
        assert!(cache.read(0, 0).is_empty());
    }

    #[test]
    fn read_does_not_bump_attempts() {
        let cache = SqliteEventCache::open_in_memory();
        let e = event(1);
        cache.write(&e);

        cache.read(10, 0);
        cache.read(10, 0);
        assert_eq!(cache.attempts(&e), Some(1));
    }

    #[test]
    fn read_excludes_entries_at_attempts_ceiling() {
        let cache = SqliteEventCache::open_in_memory();
        let exhausted = event(1);
        let eligible = event(2);

        for _ in 0..3 {
            cache.write(&exhausted);
        }
        for _ in 0..2 {
            cache.write(&eligible);
        }

        for _ in 0..10 {
            assert_eq!(cache.read(10, 3), vec![eligible.clone()]);
        }

        // Ceiling disabled: everything is eligible, nothing was deleted.
        assert_eq!(cache.read(10, 0).len(), 2);
        assert_eq!(cache.pending_count(), 2);
    }

    #[test]
    fn read_order_is_randomized() {
        let cache = SqliteEventCache::open_in_memory();
        for n in 0..30 {
            cache.write(&event(n));
        }

        let first = cache.read(1, 0);
        let varied = (0..50).any(|_| cache.read(1, 0) != first);
        assert!(varied);
    }

    #[test]
    fn unparsable_rows_are_skipped() {
        let cache = SqliteEventCache::open_in_memory();
        cache.write(&event(1));
        cache
            .with_conn("seed", |conn| {
                conn.execute("INSERT INTO cache (data, attempts) VALUES ('garbage', 1)", [])?;
                Ok(())
            })
            .unwrap();

        assert_eq!(cache.pending_count(), 2);
        assert_eq!(cache.read(10, 0), vec![event(1)]);
    }

    #[test]
    fn truncated_payload_round_trips_through_cache() {
        let cache = SqliteEventCache::open_in_memory();
        let e = Event::new("n".repeat(1028), "p".repeat(4096));

        assert!(cache.write(&e));
        let batch = cache.read(1, 0);
        assert_eq!(batch.len(), 1);

        // The shortened event still addresses the stored row.
        assert!(cache.remove(&batch[0]));
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn closed_cache_is_inert() {
        let cache = SqliteEventCache::open_in_memory();
        let e = event(1);
        cache.write(&e);

        cache.close();
        cache.close();

        assert!(!cache.ready());
        assert!(!cache.write(&e));
        assert!(!cache.remove(&e));
        assert!(!cache.exists(&e));
        assert!(cache.read(10, 0).is_empty());
        assert_eq!(cache.pending_count(), 0);
        assert_eq!(cache.attempts(&e), None);
    }

    #[test]
    fn file_cache_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.sqlite3");
        let e = event(1);

        let cache = SqliteEventCache::open(Some(&path));
        assert!(cache.ready());
        cache.write(&e);
        cache.write(&e);
        cache.close();

        let reopened = SqliteEventCache::open(Some(&path));
        assert!(reopened.ready());
        assert_eq!(reopened.attempts(&e), Some(2));
    }

    #[test]
    fn missing_directory_is_not_ready() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent").join("events.sqlite3");

        let cache = SqliteEventCache::open(Some(&path));
        assert!(!cache.ready());
        assert!(!cache.write(&event(1)));
        assert!(!path.exists());
    }

    #[test]
    fn second_open_on_same_file_is_not_ready() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.sqlite3");

        let first = SqliteEventCache::open(Some(&path));
        assert!(first.ready());

        let second = SqliteEventCache::open(Some(&path));
        assert!(!second.ready());

        // The first owner is unaffected.
        assert!(first.write(&event(1)));

        first.close();
        let third = SqliteEventCache::open(Some(&path));
        assert!(third.ready());
        assert!(third.exists(&event(1)));
    }
}
