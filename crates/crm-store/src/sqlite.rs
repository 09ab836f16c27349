//! SQLite-backed document store: records and activity log in one database.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use crm_types::{
    ActivityFilter, ActivityLogEntry, ActivityStore, Record, RecordFilter, RecordStore, StoreError,
};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value, ValueRef};
use std::path::Path;

/// SQLite store. Records are JSON documents keyed by (kind, id); activity entries are
/// append-only rows with the filterable columns broken out.
pub struct SqliteStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn =
            rusqlite::Connection::open(path).map_err(|e| StoreError::Other(e.to_string()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            rusqlite::Connection::open_in_memory().map_err(|e| StoreError::Other(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self, StoreError> {
        // Built-in lower() only folds ASCII; search must agree with the in-memory store.
        conn.create_scalar_function(
            "unicode_lower",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                Ok(match ctx.get_raw(0) {
                    ValueRef::Text(t) => Some(String::from_utf8_lossy(t).to_lowercase()),
                    _ => None,
                })
            },
        )
        .map_err(|e| StoreError::Other(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                doc TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );

            CREATE TABLE IF NOT EXISTS activity_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                action TEXT NOT NULL,
                module TEXT NOT NULL,
                record_id TEXT,
                timestamp TEXT NOT NULL,
                entry TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_created ON records(kind, created_at);
            CREATE INDEX IF NOT EXISTS idx_activity_user ON activity_logs(user_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_activity_record ON activity_logs(module, record_id);
            "#,
        )
        .map_err(|e| StoreError::Other(e.to_string()))?;

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| StoreError::Other(e.to_string()))
    }
}

/// Fixed-width UTC timestamps so text comparison orders chronologically.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn record_where<R: Record>(filter: &RecordFilter) -> Result<(String, Vec<Value>), StoreError> {
    filter.check::<R>()?;
    let mut clauses = vec!["kind = ?".to_string()];
    let mut params = vec![Value::Text(R::KIND.collection().to_string())];
    if let Some(ref search) = filter.search {
        let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
        let ors: Vec<String> = R::SEARCH_FIELDS
            .iter()
            .map(|f| {
                params.push(Value::Text(pattern.clone()));
                format!(
                    "unicode_lower(json_extract(doc, '$.{}')) LIKE ? ESCAPE '\\'",
                    f
                )
            })
            .collect();
        clauses.push(format!("({})", ors.join(" OR ")));
    }
    for (field, value) in &filter.attributes {
        clauses.push(format!("json_extract(doc, '$.{}') = ?", field));
        params.push(Value::Text(value.clone()));
    }
    if let Some(from) = filter.created_from {
        clauses.push("created_at >= ?".to_string());
        params.push(Value::Text(ts(from)));
    }
    if let Some(to) = filter.created_to {
        clauses.push("created_at <= ?".to_string());
        params.push(Value::Text(ts(to)));
    }
    Ok((clauses.join(" AND "), params))
}

fn activity_where(filter: &ActivityFilter) -> (String, Vec<Value>) {
    let mut clauses = vec!["1 = 1".to_string()];
    let mut params = Vec::new();
    if let Some(m) = filter.module {
        clauses.push("module = ?".to_string());
        params.push(Value::Text(m.as_str().to_string()));
    }
    if let Some(a) = filter.action {
        clauses.push("action = ?".to_string());
        params.push(Value::Text(a.as_str().to_string()));
    }
    if let Some(ref u) = filter.user_id {
        clauses.push("user_id = ?".to_string());
        params.push(Value::Text(u.clone()));
    }
    if let Some(ref r) = filter.record_id {
        clauses.push("record_id = ?".to_string());
        params.push(Value::Text(r.clone()));
    }
    (clauses.join(" AND "), params)
}

/// `LIMIT -1` is unbounded in SQLite; a limit past `i64::MAX` is too.
fn limit_value(limit: Option<usize>) -> Value {
    Value::Integer(limit.and_then(|l| i64::try_from(l).ok()).unwrap_or(-1))
}

/// Saturates so an oversized offset yields an empty page rather than wrapping negative.
fn offset_value(skip: usize) -> Value {
    Value::Integer(i64::try_from(skip).unwrap_or(i64::MAX))
}

fn decode<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, rusqlite::Error> {
    serde_json::from_str(json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, rusqlite::Error> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

#[async_trait]
impl<R: Record> RecordStore<R> for SqliteStore {
    async fn find(
        &self,
        filter: &RecordFilter,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<R>, StoreError> {
        let (clause, mut params) = record_where::<R>(filter)?;
        params.push(limit_value(limit));
        params.push(offset_value(skip));
        let sql = format!(
            "SELECT doc FROM records WHERE {} \
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            clause
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(decode::<R>(&row?)?);
            }
            Ok(out)
        })
    }

    async fn count(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        let (clause, params) = record_where::<R>(filter)?;
        let sql = format!("SELECT COUNT(*) FROM records WHERE {}", clause);
        self.with_conn(|conn| {
            conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| n as usize)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<R>, StoreError> {
        self.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT doc FROM records WHERE kind = ?1 AND id = ?2",
                rusqlite::params![R::KIND.collection(), id],
                |row| row.get::<_, String>(0),
            );
            match result {
                Ok(doc) => Ok(Some(decode::<R>(&doc)?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    async fn insert(&self, record: R) -> Result<R, StoreError> {
        let inserted = self.with_conn(|conn| {
            let doc = encode(&record)?;
            conn.execute(
                "INSERT OR IGNORE INTO records (kind, id, created_at, doc) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![R::KIND.collection(), record.id(), ts(record.created_at()), doc],
            )
        })?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(record.id().to_string()));
        }
        Ok(record)
    }

    async fn update_by_id(&self, id: &str, record: R) -> Result<Option<R>, StoreError> {
        let updated = self.with_conn(|conn| {
            let doc = encode(&record)?;
            conn.execute(
                "UPDATE records SET doc = ?1 WHERE kind = ?2 AND id = ?3",
                rusqlite::params![doc, R::KIND.collection(), id],
            )
        })?;
        Ok((updated > 0).then_some(record))
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM records WHERE kind = ?1 AND id = ?2",
                rusqlite::params![R::KIND.collection(), id],
            )
        })?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl ActivityStore for SqliteStore {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let json = encode(&entry)?;
            conn.execute(
                "INSERT INTO activity_logs \
                 (id, user_id, action, module, record_id, timestamp, entry) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    entry.id,
                    entry.user_id,
                    entry.action.as_str(),
                    entry.module.as_str(),
                    entry.record_id,
                    ts(entry.timestamp),
                    json,
                ],
            )
        })?;
        Ok(())
    }

    async fn find(
        &self,
        filter: &ActivityFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let (clause, mut params) = activity_where(filter);
        params.push(limit_value(Some(limit)));
        params.push(offset_value(skip));
        let sql = format!(
            "SELECT entry FROM activity_logs WHERE {} \
             ORDER BY timestamp DESC, rowid DESC LIMIT ? OFFSET ?",
            clause
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(decode::<ActivityLogEntry>(&row?)?);
            }
            Ok(out)
        })
    }

    async fn count(&self, filter: &ActivityFilter) -> Result<usize, StoreError> {
        let (clause, params) = activity_where(filter);
        let sql = format!("SELECT COUNT(*) FROM activity_logs WHERE {}", clause);
        self.with_conn(|conn| {
            conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crm_types::{
        ActivityAction, ActivityModule, Deal, DealInput, DealStage, NewActivity, Stamp,
    };

    fn deal(id: &str, title: &str, stage: DealStage, at: DateTime<Utc>) -> Deal {
        Deal::from_input(
            DealInput {
                title: Some(title.to_string()),
                amount: Some(100.0),
                stage: Some(stage),
                expected_close_date: Some("2025-06-30".to_string()),
                contact: Some("c1".to_string()),
                ..Default::default()
            },
            Stamp {
                id: id.to_string(),
                created_by: "u1".to_string(),
                now: at,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn record_roundtrip_and_filters() {
        let store = SqliteStore::in_memory().unwrap();
        let t0 = Utc::now();
        RecordStore::<Deal>::insert(&store, deal("d1", "Big 50% discount", DealStage::Won, t0))
            .await
            .unwrap();
        RecordStore::<Deal>::insert(
            &store,
            deal("d2", "Pilot", DealStage::New, t0 + Duration::seconds(1)),
        )
        .await
        .unwrap();

        let all = RecordStore::<Deal>::find(&store, &RecordFilter::new(), 0, None).await.unwrap();
        assert_eq!(all.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["d2", "d1"]);

        let won = RecordFilter::new().with("stage", "Won");
        let found = RecordStore::<Deal>::find(&store, &won, 0, Some(10)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].probability, 100.0);

        let literal_percent = RecordFilter::new().search(Some("50%".to_string()));
        assert_eq!(RecordStore::<Deal>::count(&store, &literal_percent).await.unwrap(), 1);
        let pilot = RecordFilter::new().search(Some("PILOT".to_string()));
        assert_eq!(RecordStore::<Deal>::count(&store, &pilot).await.unwrap(), 1);

        let window =
            RecordFilter::new().created_between(Some(t0 + Duration::milliseconds(500)), None);
        assert_eq!(RecordStore::<Deal>::count(&store, &window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn created_range_is_inclusive_at_both_ends() {
        let store = SqliteStore::in_memory().unwrap();
        let start: DateTime<Utc> = "2024-03-01T09:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2024-03-31T18:00:00Z".parse().unwrap();
        let tick = Duration::microseconds(1);
        for (id, at) in [
            ("before", start - tick),
            ("at-start", start),
            ("at-end", end),
            ("after", end + tick),
        ] {
            RecordStore::<Deal>::insert(&store, deal(id, "Pilot", DealStage::New, at))
                .await
                .unwrap();
        }

        let window = RecordFilter::new().created_between(Some(start), Some(end));
        let found = RecordStore::<Deal>::find(&store, &window, 0, None).await.unwrap();
        assert_eq!(
            found.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec!["at-end", "at-start"]
        );

        let from_only = RecordFilter::new().created_between(Some(start), None);
        assert_eq!(RecordStore::<Deal>::count(&store, &from_only).await.unwrap(), 3);
        let to_only = RecordFilter::new().created_between(None, Some(end));
        assert_eq!(RecordStore::<Deal>::count(&store, &to_only).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn search_folds_non_ascii_case() {
        let store = SqliteStore::in_memory().unwrap();
        let t0 = Utc::now();
        RecordStore::<Deal>::insert(&store, deal("d1", "ÉCOLE Ärzte", DealStage::New, t0))
            .await
            .unwrap();
        RecordStore::<Deal>::insert(
            &store,
            deal("d2", "Pilot", DealStage::New, t0 + Duration::seconds(1)),
        )
        .await
        .unwrap();

        for term in ["école", "ärzte", "ÉCOLE", "Ärz"] {
            let f = RecordFilter::new().search(Some(term.to_string()));
            let found = RecordStore::<Deal>::find(&store, &f, 0, None).await.unwrap();
            assert_eq!(found.len(), 1, "search {}", term);
            assert_eq!(found[0].id, "d1");
            assert!(f.matches(&found[0]), "in-memory filter disagrees for {}", term);
        }
    }

    #[tokio::test]
    async fn oversized_offset_returns_an_empty_page() {
        let store = SqliteStore::in_memory().unwrap();
        RecordStore::<Deal>::insert(&store, deal("d1", "Pilot", DealStage::New, Utc::now()))
            .await
            .unwrap();
        let page = RecordStore::<Deal>::find(&store, &RecordFilter::new(), usize::MAX, Some(10))
            .await
            .unwrap();
        assert!(page.is_empty());

        let e = NewActivity::new("u1", ActivityAction::Create, ActivityModule::Deal)
            .into_entry("e0".to_string(), Utc::now());
        ActivityStore::append(&store, e).await.unwrap();
        let entries = ActivityStore::find(&store, &ActivityFilter::default(), usize::MAX, 10)
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn update_delete_and_missing_ids() {
        let store = SqliteStore::in_memory().unwrap();
        let mut d = deal("d1", "Pilot", DealStage::New, Utc::now());
        RecordStore::<Deal>::insert(&store, d.clone()).await.unwrap();
        assert!(matches!(
            RecordStore::<Deal>::insert(&store, d.clone()).await,
            Err(StoreError::Duplicate(_))
        ));

        d.title = "Pilot extended".to_string();
        assert!(RecordStore::<Deal>::update_by_id(&store, "d1", d.clone())
            .await
            .unwrap()
            .is_some());
        let got = RecordStore::<Deal>::find_by_id(&store, "d1").await.unwrap();
        assert_eq!(got.unwrap().title, "Pilot extended");
        assert!(RecordStore::<Deal>::update_by_id(&store, "d9", d)
            .await
            .unwrap()
            .is_none());

        assert!(RecordStore::<Deal>::delete_by_id(&store, "d1").await.unwrap());
        assert!(!RecordStore::<Deal>::delete_by_id(&store, "d1").await.unwrap());
    }

    #[tokio::test]
    async fn activity_rows_filter_and_order() {
        let store = SqliteStore::in_memory().unwrap();
        let t0 = Utc::now();
        for i in 0..4 {
            let action = if i % 2 == 0 {
                ActivityAction::Create
            } else {
                ActivityAction::Delete
            };
            let e = NewActivity::new("u1", action, ActivityModule::Deal)
                .record("d1", "Pilot")
                .into_entry(format!("e{}", i), t0 + Duration::seconds(i));
            ActivityStore::append(&store, e).await.unwrap();
        }
        let f = ActivityFilter {
            action: Some(ActivityAction::Create),
            record_id: Some("d1".to_string()),
            ..Default::default()
        };
        assert_eq!(ActivityStore::count(&store, &f).await.unwrap(), 2);
        let found = ActivityStore::find(&store, &f, 0, 10).await.unwrap();
        assert_eq!(found.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["e2", "e0"]);
    }
}
