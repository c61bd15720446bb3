use super::{mean, percentage, window_start, CacheStats, CacheStore};
use crate::common::bounded::bounded;
use crate::common::constants::{normalize_city, DEFAULT_STORE_TIMEOUT_MS};
use crate::common::error::{PlayScannerError, Result};
use crate::domain::*;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const TABLES: [&str; 4] = [
    "playscanner_cache",
    "playscanner_collection_log",
    "playscanner_venues",
    "playscanner_health_snapshots",
];

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS playscanner_cache (
        cache_key      TEXT PRIMARY KEY,
        city           TEXT NOT NULL,
        date           TEXT NOT NULL,
        slots          TEXT NOT NULL,
        total_slots    INTEGER NOT NULL,
        unique_venues  INTEGER NOT NULL,
        provider       TEXT NOT NULL,
        collected_at   INTEGER NOT NULL,
        expires_at     INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_playscanner_cache_expires ON playscanner_cache (expires_at);
    CREATE TABLE IF NOT EXISTS playscanner_collection_log (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id      TEXT NOT NULL,
        city               TEXT NOT NULL,
        date               TEXT NOT NULL,
        status             TEXT NOT NULL,
        error_message      TEXT,
        slots_collected    INTEGER NOT NULL,
        venues_processed   INTEGER NOT NULL,
        execution_time_ms  INTEGER NOT NULL,
        provider           TEXT NOT NULL,
        created_at         INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_playscanner_log_created ON playscanner_collection_log (created_at);
    CREATE TABLE IF NOT EXISTS playscanner_venues (
        venue_id    TEXT NOT NULL,
        provider    TEXT NOT NULL,
        city        TEXT NOT NULL,
        venue_data  TEXT NOT NULL,
        is_active   INTEGER NOT NULL DEFAULT 1,
        last_seen   INTEGER NOT NULL,
        PRIMARY KEY (venue_id, provider)
    );
    CREATE TABLE IF NOT EXISTS playscanner_health_snapshots (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        status      TEXT NOT NULL,
        report      TEXT NOT NULL,
        created_at  INTEGER NOT NULL
    );
"#;

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| PlayScannerError::store(format!("invalid timestamp {ms}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| PlayScannerError::store(format!("invalid stored date '{raw}': {e}")))
}

/// SQLite-backed store. The connection lives behind a mutex and every operation
/// runs on the blocking pool under a timeout, so a stuck disk surfaces as `Timeout`.
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl SqliteCacheStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened SQLite cache store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        bounded(operation, self.timeout, async move {
            tokio::task::spawn_blocking(move || {
                let mut guard = conn
                    .lock()
                    .map_err(|_| PlayScannerError::store("connection mutex poisoned"))?;
                f(&mut guard)
            })
            .await?
        })
        .await
    }
}

type CacheRow = (String, String, String, String, i64, i64, String, i64, i64);

fn entry_from_row(row: CacheRow) -> Result<CacheEntry> {
    let (cache_key, city, date, slots, total_slots, unique_venues, provider, collected_at, expires_at) =
        row;
    Ok(CacheEntry {
        cache_key,
        city,
        date: parse_date(&date)?,
        slots: serde_json::from_str(&slots)?,
        metadata: CacheMetadata {
            total_slots: total_slots as usize,
            unique_venues: unique_venues as usize,
            collected_at: from_millis(collected_at)?,
            provider,
        },
        expires_at: from_millis(expires_at)?,
    })
}

type RunRow = (String, String, String, String, Option<String>, i64, i64, i64, String, i64);

fn run_from_row(row: RunRow) -> Result<CollectionRun> {
    let (collection_id, city, date, status, error_message, slots, venues, exec_ms, provider, created_at) =
        row;
    Ok(CollectionRun {
        collection_id: Uuid::parse_str(&collection_id)
            .map_err(|e| PlayScannerError::store(format!("invalid collection id: {e}")))?,
        city,
        date: parse_date(&date)?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| PlayScannerError::store(format!("invalid run status '{status}'")))?,
        error_message,
        slots_collected: slots as usize,
        venues_processed: venues as usize,
        execution_time_ms: exec_ms as u64,
        provider,
        created_at: from_millis(created_at)?,
    })
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, city: &str, date: NaiveDate) -> Result<Option<CacheEntry>> {
        let key = cache_key(city, date);
        let now = to_millis(Utc::now());
        let row: Option<CacheRow> = self
            .run("cache get", move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT cache_key, city, date, slots, total_slots, unique_venues, provider, collected_at, expires_at
                         FROM playscanner_cache WHERE cache_key = ?1 AND expires_at > ?2",
                        params![key, now],
                        |r| {
                            Ok((
                                r.get(0)?,
                                r.get(1)?,
                                r.get(2)?,
                                r.get(3)?,
                                r.get(4)?,
                                r.get(5)?,
                                r.get(6)?,
                                r.get(7)?,
                                r.get(8)?,
                            ))
                        },
                    )
                    .optional()?)
            })
            .await?;
        row.map(entry_from_row).transpose()
    }

    #[instrument(skip(self, slots), fields(slots = slots.len()))]
    async fn upsert(
        &self,
        city: &str,
        date: NaiveDate,
        slots: Vec<CourtSlot>,
        provider: &str,
        ttl: chrono::Duration,
    ) -> Result<CacheEntry> {
        let now = Utc::now();
        let entry = CacheEntry {
            cache_key: cache_key(city, date),
            city: normalize_city(city),
            date,
            metadata: CacheMetadata::from_slots(&slots, provider, now),
            slots,
            expires_at: now + ttl,
        };
        let payload = serde_json::to_string(&entry.slots)?;
        let row = entry.clone();
        self.run("cache upsert", move |conn| {
            conn.execute(
                "INSERT INTO playscanner_cache
                    (cache_key, city, date, slots, total_slots, unique_venues, provider, collected_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(cache_key) DO UPDATE SET
                    city=excluded.city, date=excluded.date, slots=excluded.slots,
                    total_slots=excluded.total_slots, unique_venues=excluded.unique_venues,
                    provider=excluded.provider, collected_at=excluded.collected_at,
                    expires_at=excluded.expires_at",
                params![
                    row.cache_key,
                    row.city,
                    row.date.format("%Y-%m-%d").to_string(),
                    payload,
                    row.metadata.total_slots as i64,
                    row.metadata.unique_venues as i64,
                    row.metadata.provider,
                    to_millis(row.metadata.collected_at),
                    to_millis(row.expires_at),
                ],
            )?;
            Ok(())
        })
        .await?;
        debug!("Upserted cache entry {}", entry.cache_key);
        Ok(entry)
    }

    async fn get_cache_stats(&self) -> Result<CacheStats> {
        let now = to_millis(Utc::now());
        let (active, slots, cities, earliest, latest, last): (
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
            Option<i64>,
        ) = self
            .run("cache stats", move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(total_slots), 0), COUNT(DISTINCT city),
                            MIN(date), MAX(date), MAX(collected_at)
                     FROM playscanner_cache WHERE expires_at > ?1",
                    params![now],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
                )?)
            })
            .await?;
        Ok(CacheStats {
            active_entries: active as usize,
            total_slots: slots as usize,
            cities: cities as usize,
            earliest_date: earliest.as_deref().map(parse_date).transpose()?,
            latest_date: latest.as_deref().map(parse_date).transpose()?,
            last_collected_at: last.map(from_millis).transpose()?,
        })
    }

    async fn cleanup(&self) -> Result<usize> {
        let now = to_millis(Utc::now());
        let removed = self
            .run("cache cleanup", move |conn| {
                Ok(conn.execute(
                    "DELETE FROM playscanner_cache WHERE expires_at <= ?1",
                    params![now],
                )?)
            })
            .await?;
        if removed > 0 {
            info!("Removed {} expired cache entries", removed);
        }
        Ok(removed)
    }

    async fn record_collection_run(&self, run: &CollectionRun) -> Result<()> {
        let run = run.clone();
        self.run("record collection run", move |conn| {
            conn.execute(
                "INSERT INTO playscanner_collection_log
                    (collection_id, city, date, status, error_message, slots_collected,
                     venues_processed, execution_time_ms, provider, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    run.collection_id.to_string(),
                    run.city,
                    run.date.format("%Y-%m-%d").to_string(),
                    run.status.as_str(),
                    run.error_message,
                    run.slots_collected as i64,
                    run.venues_processed as i64,
                    run.execution_time_ms as i64,
                    run.provider,
                    to_millis(run.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_recent_collections(&self, limit: usize) -> Result<Vec<CollectionRun>> {
        let rows: Vec<RunRow> = self
            .run("recent collections", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT collection_id, city, date, status, error_message, slots_collected,
                            venues_processed, execution_time_ms, provider, created_at
                     FROM playscanner_collection_log
                     ORDER BY created_at DESC, id DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit as i64], |r| {
                        Ok((
                            r.get(0)?,
                            r.get(1)?,
                            r.get(2)?,
                            r.get(3)?,
                            r.get(4)?,
                            r.get(5)?,
                            r.get(6)?,
                            r.get(7)?,
                            r.get(8)?,
                            r.get(9)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<RunRow>>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(run_from_row).collect()
    }

    async fn get_collection_success_rate(&self, window_hours: u32) -> Result<f64> {
        let since = to_millis(window_start(window_hours));
        let (total, succeeded): (i64, i64) = self
            .run("collection success rate", move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0)
                     FROM playscanner_collection_log WHERE created_at >= ?1",
                    params![since],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )?)
            })
            .await?;
        Ok(percentage(succeeded as usize, total as usize))
    }

    async fn get_average_execution_time(&self, window_hours: u32) -> Result<f64> {
        let since = to_millis(window_start(window_hours));
        let (count, total_ms): (i64, i64) = self
            .run("average execution time", move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(execution_time_ms), 0)
                     FROM playscanner_collection_log
                     WHERE status = 'success' AND created_at >= ?1",
                    params![since],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )?)
            })
            .await?;
        Ok(mean(total_ms as u64, count as usize))
    }

    async fn get_last_successful_collection(&self) -> Result<Option<DateTime<Utc>>> {
        let last: Option<i64> = self
            .run("last successful collection", |conn| {
                Ok(conn.query_row(
                    "SELECT MAX(created_at) FROM playscanner_collection_log WHERE status = 'success'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .await?;
        last.map(from_millis).transpose()
    }

    async fn cleanup_collection_runs(&self, retention_days: u32) -> Result<usize> {
        let cutoff = to_millis(Utc::now() - chrono::Duration::days(retention_days as i64));
        self.run("collection log retention", move |conn| {
            Ok(conn.execute(
                "DELETE FROM playscanner_collection_log WHERE created_at < ?1",
                params![cutoff],
            )?)
        })
        .await
    }

    async fn upsert_venues(&self, city: &str, venues: &[Venue]) -> Result<usize> {
        let city = normalize_city(city);
        let now = to_millis(Utc::now());
        let rows = venues
            .iter()
            .map(|v| Ok((v.id.clone(), v.provider.clone(), serde_json::to_string(v)?)))
            .collect::<Result<Vec<(String, String, String)>>>()?;
        self.run("venue upsert", move |conn| {
            let tx = conn.transaction()?;
            for (venue_id, provider, data) in &rows {
                tx.execute(
                    "INSERT INTO playscanner_venues (venue_id, provider, city, venue_data, is_active, last_seen)
                     VALUES (?1, ?2, ?3, ?4, 1, ?5)
                     ON CONFLICT(venue_id, provider) DO UPDATE SET
                        city=excluded.city, venue_data=excluded.venue_data,
                        is_active=1, last_seen=excluded.last_seen",
                    params![venue_id, provider, city, data, now],
                )?;
            }
            tx.commit()?;
            Ok(rows.len())
        })
        .await
    }

    async fn get_venues(&self, city: Option<&str>) -> Result<Vec<VenueRecord>> {
        let city = city.map(normalize_city);
        let rows: Vec<(String, String, String, String, bool, i64)> = self
            .run("venue listing", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT venue_id, provider, city, venue_data, is_active, last_seen
                     FROM playscanner_venues
                     WHERE ?1 IS NULL OR city = ?1
                     ORDER BY venue_id",
                )?;
                let rows = stmt
                    .query_map(params![city], |r| {
                        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        let mut venues = rows
            .into_iter()
            .map(|(venue_id, provider, city, data, is_active, last_seen)| {
                Ok(VenueRecord {
                    venue_id,
                    provider,
                    city,
                    venue_data: serde_json::from_str(&data)?,
                    is_active,
                    last_seen: from_millis(last_seen)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        venues.sort_by(|a, b| a.venue_data.name.cmp(&b.venue_data.name));
        Ok(venues)
    }

    async fn record_health_snapshot(&self, status: &str, report: &serde_json::Value) -> Result<()> {
        let status = status.to_string();
        let report = serde_json::to_string(report)?;
        let now = to_millis(Utc::now());
        self.run("health snapshot", move |conn| {
            conn.execute(
                "INSERT INTO playscanner_health_snapshots (status, report, created_at) VALUES (?1, ?2, ?3)",
                params![status, report, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn health_check(&self) -> bool {
        let result = self
            .run("store health check", |conn| {
                let mut stmt = conn.prepare(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?1, ?2, ?3, ?4)",
                )?;
                let found: i64 =
                    stmt.query_row(params![TABLES[0], TABLES[1], TABLES[2], TABLES[3]], |r| r.get(0))?;
                Ok(found as usize == TABLES.len())
            })
            .await;
        match result {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Store health check failed: {}", e);
                false
            }
        }
    }
}
