use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub async fn connect(database_url: &str) -> sqlx::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY,
        uni_id TEXT NOT NULL UNIQUE,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        major TEXT,
        title TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS schedule_entries (
        user_id BLOB NOT NULL REFERENCES users(id),
        position INTEGER NOT NULL,
        day TEXT NOT NULL,
        subject TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        mode TEXT NOT NULL,
        room TEXT NOT NULL,
        PRIMARY KEY (user_id, position)
    )",
    "CREATE TABLE IF NOT EXISTS conversations (
        id BLOB PRIMARY KEY,
        user_a BLOB NOT NULL,
        user_b BLOB NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (user_a, user_b)
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id BLOB PRIMARY KEY,
        conversation_id BLOB NOT NULL REFERENCES conversations(id),
        sender_id BLOB NOT NULL,
        receiver_id BLOB NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS todos (
        id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL REFERENCES users(id),
        title TEXT NOT NULL,
        description TEXT,
        date TEXT NOT NULL,
        start_time TEXT,
        end_time TEXT,
        completed INTEGER NOT NULL DEFAULT 0,
        priority TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS announcements (
        id BLOB PRIMARY KEY,
        sender_id BLOB NOT NULL REFERENCES users(id),
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        kind TEXT NOT NULL,
        target TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS appointments (
        id BLOB PRIMARY KEY,
        student_id BLOB NOT NULL REFERENCES users(id),
        teacher_id BLOB NOT NULL REFERENCES users(id),
        date TEXT NOT NULL,
        reason TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS notifications (
        id BLOB PRIMARY KEY,
        to_user BLOB NOT NULL REFERENCES users(id),
        from_user BLOB NOT NULL,
        kind TEXT NOT NULL,
        message TEXT NOT NULL,
        related_id BLOB NOT NULL,
        read INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
];
