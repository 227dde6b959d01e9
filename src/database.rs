use tokio_rusqlite::{Connection, Result};

pub async fn init_db(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path).await?;
    create_tables(&conn).await?;
    Ok(conn)
}

/// In-memory database, used by the test suites.
pub async fn init_db_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().await?;
    create_tables(&conn).await?;
    Ok(conn)
}

async fn create_tables(conn: &Connection) -> Result<()> {
    conn.call(|conn| {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                guid TEXT UNIQUE NOT NULL,
                title TEXT,
                link TEXT,
                published TEXT,
                summary TEXT,
                media TEXT,
                liked INTEGER NOT NULL DEFAULT 0,
                hidden INTEGER NOT NULL DEFAULT 0
                )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS feeds (
                url TEXT PRIMARY KEY
                )",
            [],
        )?;
        Ok(())
    })
    .await
}
