//! SQLite-backed choice store.
//!
//! Rows live in the `dbchoice_choices` table whose `UNIQUE(group_name, value)`
//! constraint enforces the store-wide uniqueness invariant. Bulk writes and
//! batches run inside one transaction each; dropping an uncommitted
//! transaction rolls it back.

mod schema;

use async_trait::async_trait;
use chrono::DateTime;
use dbchoice_core::{
    ChoiceFilters, ChoiceId, ChoiceRecord, ChoiceUpdate, DbChoiceError, DbChoiceResult,
    FieldMatch, NewChoice, StoreError,
};
use dbchoice_storage::{
    BatchOutcome, ChangeKind, ChangeListener, ChangeNotifier, ChoiceBatch, ChoiceChange,
    ChoiceStore,
};
use sqlx::sqlite::{self, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::schema::init_db;

const COLUMNS: &str =
    "id, group_name, name, value, label, ordering, is_system_default, created_at";

// Helper functions
//******************

fn inspect(err: &sqlx::Error) {
    tracing::warn!(error = %err, "sqlite choice store error");
}

fn db_error(err: sqlx::Error) -> DbChoiceError {
    inspect(&err);
    let reason = err.to_string();
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable { reason }.into()
        }
        _ => StoreError::TransactionFailed { reason }.into(),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|e| e.is_unique_violation())
}

fn read_record(row: &SqliteRow) -> DbChoiceResult<ChoiceRecord> {
    let invalid = |e: sqlx::Error| StoreError::InvalidRow {
        reason: e.to_string(),
    };

    let id: String = row.try_get("id").map_err(invalid)?;
    let id = ChoiceId::parse_str(&id).map_err(|e| StoreError::InvalidRow {
        reason: format!("bad id {}: {}", id, e),
    })?;
    let created_at: i64 = row.try_get("created_at").map_err(invalid)?;
    let created_at =
        DateTime::from_timestamp_millis(created_at).ok_or_else(|| StoreError::InvalidRow {
            reason: format!("bad created_at {}", created_at),
        })?;

    Ok(ChoiceRecord {
        id,
        group_name: row.try_get("group_name").map_err(invalid)?,
        name: row.try_get("name").map_err(invalid)?,
        value: row.try_get("value").map_err(invalid)?,
        label: row.try_get("label").map_err(invalid)?,
        ordering: row.try_get("ordering").map_err(invalid)?,
        is_system_default: row.try_get("is_system_default").map_err(invalid)?,
        created_at,
    })
}

fn push_matches(query: &mut QueryBuilder<'_, Sqlite>, matches: &[FieldMatch]) {
    for m in matches {
        query.push(" AND ").push(m.column()).push(" = ");
        match m {
            FieldMatch::GroupName(v)
            | FieldMatch::Name(v)
            | FieldMatch::Value(v)
            | FieldMatch::Label(v) => {
                query.push_bind(v.clone());
            }
            FieldMatch::Ordering(v) => {
                query.push_bind(*v);
            }
            FieldMatch::IsSystemDefault(v) => {
                query.push_bind(*v);
            }
        }
    }
}

async fn insert_record(
    conn: &mut SqliteConnection,
    record: &ChoiceRecord,
    ignore_conflicts: bool,
) -> Result<bool, sqlx::Error> {
    let sql = if ignore_conflicts {
        "INSERT OR IGNORE INTO dbchoice_choices (id, group_name, name, value, label, ordering, is_system_default, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    } else {
        "INSERT INTO dbchoice_choices (id, group_name, name, value, label, ordering, is_system_default, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    };

    let res = sqlx::query(sql)
        .bind(record.id.to_string())
        .bind(&record.group_name)
        .bind(&record.name)
        .bind(&record.value)
        .bind(&record.label)
        .bind(record.ordering)
        .bind(record.is_system_default)
        .bind(record.created_at.timestamp_millis())
        .execute(conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

async fn insert_all(
    conn: &mut SqliteConnection,
    records: Vec<NewChoice>,
    ignore_conflicts: bool,
) -> DbChoiceResult<Vec<ChoiceRecord>> {
    let mut created = Vec::with_capacity(records.len());
    for choice in records {
        choice.validate()?;
        let record = choice.into_record();
        match insert_record(conn, &record, ignore_conflicts).await {
            Ok(true) => created.push(record),
            Ok(false) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::UniqueViolation {
                    group_name: record.group_name,
                    value: record.value,
                }
                .into())
            }
            Err(err) => return Err(db_error(err)),
        }
    }
    Ok(created)
}

async fn delete_matching(
    conn: &mut SqliteConnection,
    group_names: &[String],
    matches: &[FieldMatch],
) -> DbChoiceResult<u64> {
    if group_names.is_empty() {
        return Ok(0);
    }

    let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM dbchoice_choices WHERE group_name IN (");
    let mut separated = query.separated(", ");
    for group_name in group_names {
        separated.push_bind(group_name.clone());
    }
    separated.push_unseparated(")");
    push_matches(&mut query, matches);

    let res = query.build().execute(conn).await.map_err(db_error)?;
    Ok(res.rows_affected())
}

async fn fetch_by_id(conn: &mut SqliteConnection, id: ChoiceId) -> DbChoiceResult<Option<ChoiceRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM dbchoice_choices WHERE id = ?1", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await
        .map_err(db_error)?;
    row.as_ref().map(read_record).transpose()
}

/// [`ChoiceStore`] backed by a SQLite database file.
#[derive(Debug)]
pub struct SqliteChoiceStore {
    db: SqlitePool,
    notifier: ChangeNotifier,
}

impl SqliteChoiceStore {
    /// Open (creating if missing) the database at `path` and initialize the schema.
    pub async fn new(path: impl AsRef<Path>) -> DbChoiceResult<Self> {
        let opts = sqlite::SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(sqlite::SqliteJournalMode::Wal);
        let db = sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(db_error)?;

        Self::with_pool(db).await
    }

    /// A private in-memory database, mainly for tests.
    pub async fn in_memory() -> DbChoiceResult<Self> {
        let opts = sqlite::SqliteConnectOptions::from_str("sqlite::memory:").map_err(db_error)?;
        // Every pooled connection would open its own empty database, so keep one alive.
        let db = sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(db_error)?;

        Self::with_pool(db).await
    }

    /// Use an existing pool; the schema is created if needed.
    pub async fn with_pool(db: SqlitePool) -> DbChoiceResult<Self> {
        init_db(&db).await.map_err(db_error)?;
        Ok(Self {
            db,
            notifier: ChangeNotifier::new(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl ChoiceStore for SqliteChoiceStore {
    async fn query(
        &self,
        group_name: &str,
        filters: &ChoiceFilters,
    ) -> DbChoiceResult<Vec<ChoiceRecord>> {
        let matches = filters.resolve()?;

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM dbchoice_choices WHERE group_name = ",
            COLUMNS
        ));
        query.push_bind(group_name.to_string());
        push_matches(&mut query, &matches);
        query.push(" ORDER BY ordering, label");

        let rows = query.build().fetch_all(&self.db).await.map_err(db_error)?;
        rows.iter().map(read_record).collect()
    }

    async fn bulk_create(
        &self,
        records: Vec<NewChoice>,
        ignore_conflicts: bool,
    ) -> DbChoiceResult<Vec<ChoiceRecord>> {
        let mut tx = self.db.begin().await.map_err(db_error)?;
        let created = insert_all(&mut tx, records, ignore_conflicts).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(created)
    }

    async fn bulk_delete(
        &self,
        group_names: &[String],
        filters: &ChoiceFilters,
    ) -> DbChoiceResult<u64> {
        let matches = filters.resolve()?;
        let mut conn = self.db.acquire().await.map_err(db_error)?;
        delete_matching(&mut conn, group_names, &matches).await
    }

    async fn apply_batch(&self, batch: ChoiceBatch) -> DbChoiceResult<BatchOutcome> {
        let mut deletes = Vec::with_capacity(batch.deletes.len());
        for spec in &batch.deletes {
            deletes.push((spec.group_names.as_slice(), spec.filters.resolve()?));
        }

        let mut tx = self.db.begin().await.map_err(db_error)?;
        let mut deleted = 0;
        for (group_names, matches) in &deletes {
            deleted += delete_matching(&mut tx, group_names, matches).await?;
        }
        let created = insert_all(&mut tx, batch.creates, batch.ignore_conflicts).await?;
        tx.commit().await.map_err(db_error)?;

        Ok(BatchOutcome { deleted, created })
    }

    async fn create(&self, choice: NewChoice) -> DbChoiceResult<ChoiceRecord> {
        let mut tx = self.db.begin().await.map_err(db_error)?;
        let record = insert_all(&mut tx, vec![choice], false)
            .await?
            .pop()
            .ok_or_else(|| StoreError::TransactionFailed {
                reason: "insert produced no row".to_string(),
            })?;
        tx.commit().await.map_err(db_error)?;

        self.notifier
            .notify(ChoiceChange::new(ChangeKind::Created, &record))
            .await;
        Ok(record)
    }

    async fn get(&self, id: ChoiceId) -> DbChoiceResult<Option<ChoiceRecord>> {
        let mut conn = self.db.acquire().await.map_err(db_error)?;
        fetch_by_id(&mut conn, id).await
    }

    async fn update(&self, id: ChoiceId, update: ChoiceUpdate) -> DbChoiceResult<ChoiceRecord> {
        let mut tx = self.db.begin().await.map_err(db_error)?;
        let mut record = fetch_by_id(&mut tx, id)
            .await?
            .ok_or(StoreError::NotFound { id })?;
        record.apply_update(update)?;

        let res = sqlx::query(
            "UPDATE dbchoice_choices SET name = ?1, value = ?2, label = ?3, ordering = ?4 WHERE id = ?5",
        )
        .bind(&record.name)
        .bind(&record.value)
        .bind(&record.label)
        .bind(record.ordering)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await;

        match res {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::UniqueViolation {
                    group_name: record.group_name,
                    value: record.value,
                }
                .into())
            }
            Err(err) => return Err(db_error(err)),
        }
        tx.commit().await.map_err(db_error)?;

        self.notifier
            .notify(ChoiceChange::new(ChangeKind::Updated, &record))
            .await;
        Ok(record)
    }

    async fn delete(&self, id: ChoiceId) -> DbChoiceResult<()> {
        let mut tx = self.db.begin().await.map_err(db_error)?;
        let record = fetch_by_id(&mut tx, id)
            .await?
            .ok_or(StoreError::NotFound { id })?;

        sqlx::query("DELETE FROM dbchoice_choices WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        self.notifier
            .notify(ChoiceChange::new(ChangeKind::Deleted, &record))
            .await;
        Ok(())
    }

    fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> DbChoiceResult<()> {
        self.notifier.subscribe(listener)
    }

    async fn health_check(&self) -> DbChoiceResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.db)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}
