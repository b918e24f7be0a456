//! Database schema initialization

use sqlx::SqlitePool;

/// Create the choice table and its indexes if they do not exist yet.
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS dbchoice_choices (
        id text NOT NULL,
        group_name text NOT NULL CHECK (group_name <> ''),
        name text NOT NULL,
        value text NOT NULL,
        label text NOT NULL,
        ordering integer NOT NULL DEFAULT 0,
        is_system_default integer NOT NULL DEFAULT 0,
        created_at integer NOT NULL,
        PRIMARY KEY(id),
        UNIQUE(group_name, value)
    )",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_dbchoice_choices_group
        ON dbchoice_choices(group_name, ordering, label)",
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
