use sqlx::SqlitePool;

use crate::core::errors::ApiError;

const SCHEMA_VERSION: i64 = 1;

const STATEMENTS: &[&str] = &[
    "\
    CREATE TABLE IF NOT EXISTS domains (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE CHECK(length(trim(name)) > 0),
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "\
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL CHECK(role IN ('user', 'admin', 'super_admin')),
        domain_id INTEGER REFERENCES domains(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK(role = 'super_admin' OR domain_id IS NOT NULL)
    )",
    "\
    CREATE TABLE IF NOT EXISTS docs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        domain_id INTEGER NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )",
    "\
    CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        meta_data TEXT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        domain_id INTEGER NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
        doc_id INTEGER NOT NULL REFERENCES docs(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "\
    CREATE TABLE IF NOT EXISTS feedback (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        domain_id INTEGER NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
        content TEXT NOT NULL,
        rating INTEGER NOT NULL CHECK(rating BETWEEN 1 AND 5),
        question TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "\
    CREATE TABLE IF NOT EXISTS chat_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        domain_id INTEGER REFERENCES domains(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL
    )",
    "\
    CREATE TABLE IF NOT EXISTS chat_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        question TEXT NOT NULL,
        answer TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_domain ON users(domain_id)",
    "CREATE INDEX IF NOT EXISTS idx_docs_domain ON docs(domain_id)",
    "CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(domain_id, doc_id)",
    "CREATE INDEX IF NOT EXISTS idx_feedback_domain ON feedback(domain_id)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_owner ON chat_sessions(user_id, domain_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_id, id)",
];

pub(super) async fn migrate(pool: &SqlitePool) -> Result<(), ApiError> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(ApiError::persistence)?;

    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    let mut tx = pool.begin().await.map_err(ApiError::persistence)?;
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::persistence)?;
    }
    let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
    sqlx::query(&pragma)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::persistence)?;
    tx.commit().await.map_err(ApiError::persistence)?;

    tracing::info!("Relational schema migrated to version {}", SCHEMA_VERSION);
    Ok(())
}
