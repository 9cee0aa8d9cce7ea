use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            display_name  TEXT NOT NULL,
            avatar_url    TEXT,
            is_anonymous  INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS groups (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            description   TEXT,
            avatar_url    TEXT,
            created_by    TEXT REFERENCES users(id),
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id      TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            is_admin      INTEGER NOT NULL DEFAULT 0,
            joined_at     TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(group_id, user_id)
        );

        -- Integer id is the monotonic ordering key for a group's history.
        CREATE TABLE IF NOT EXISTS messages (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id      TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            body          TEXT NOT NULL,
            kind          TEXT NOT NULL DEFAULT 'text' CHECK (kind IN ('text', 'system')),
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(group_id, id);

        -- Seed the default group every new identity joins
        INSERT OR IGNORE INTO groups (id, name, description)
            VALUES ('00000000-0000-0000-0000-000000000001', 'general',
                    'Default group for everyone');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
