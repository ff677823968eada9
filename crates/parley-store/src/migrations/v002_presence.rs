use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS presence (
    user_id   INTEGER PRIMARY KEY NOT NULL,   -- FK -> users(id)
    last_seen TEXT NOT NULL,                  -- RFC-3339
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
