use crate::Database;
use crate::models::{GroupRow, HistoryRow, MessageRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        display_name: &str,
        is_anonymous: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, is_anonymous) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, username, display_name, is_anonymous],
            )?;
            Ok(())
        })
    }

    /// Create a user and its membership in `group_id` as one transaction, so
    /// a failure never leaves an identity outside its group.
    pub fn create_user_in_group(
        &self,
        id: &str,
        username: &str,
        display_name: &str,
        is_anonymous: bool,
        group_id: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO users (id, username, display_name, is_anonymous) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, username, display_name, is_anonymous],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![group_id, id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    // -- Groups --

    pub fn list_groups(&self) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.description, g.avatar_url, g.created_by,
                        u.display_name, g.created_at
                 FROM groups g
                 LEFT JOIN users u ON g.created_by = u.id
                 ORDER BY g.created_at",
            )?;
            let rows = stmt
                .query_map([], group_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_group(&self, id: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.description, g.avatar_url, g.created_by,
                        u.display_name, g.created_at
                 FROM groups g
                 LEFT JOIN users u ON g.created_by = u.id
                 WHERE g.id = ?1",
            )?;
            stmt.query_row([id], group_row).optional()
        })
    }

    /// Add a user to a group's persisted membership. The UNIQUE(group_id,
    /// user_id) constraint makes this idempotent.
    pub fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![group_id, user_id],
            )?;
            Ok(())
        })
    }

    // -- Messages --

    /// Insert a message and return the stored row with its assigned id.
    /// The id is the monotonic ordering key; `created_at` is computed here so
    /// the broadcast payload and the stored row always agree.
    pub fn insert_message(
        &self,
        group_id: &str,
        user_id: &str,
        body: &str,
        kind: &str,
    ) -> Result<MessageRow> {
        let created_at = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (group_id, user_id, body, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![group_id, user_id, body, kind, created_at],
            )?;
            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                group_id: group_id.to_string(),
                user_id: user_id.to_string(),
                body: body.to_string(),
                kind: kind.to_string(),
                created_at: created_at.clone(),
            })
        })
    }

    /// Full history of a group, ascending by assigned id, joined with the
    /// author identity for display projection.
    pub fn fetch_history(&self, group_id: &str) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.group_id, m.user_id, m.body, m.kind, m.created_at,
                        u.display_name, u.is_anonymous, u.avatar_url
                 FROM messages m
                 JOIN users u ON m.user_id = u.id
                 WHERE m.group_id = ?1
                 ORDER BY m.id ASC",
            )?;
            let rows = stmt
                .query_map([group_id], |row| {
                    Ok(HistoryRow {
                        message: MessageRow {
                            id: row.get(0)?,
                            group_id: row.get(1)?,
                            user_id: row.get(2)?,
                            body: row.get(3)?,
                            kind: row.get(4)?,
                            created_at: row.get(5)?,
                        },
                        display_name: row.get(6)?,
                        is_anonymous: row.get(7)?,
                        avatar_url: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, display_name, avatar_url, is_anonymous, created_at
         FROM users WHERE id = ?1",
    )?;

    stmt.query_row([id], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            avatar_url: row.get(3)?,
            is_anonymous: row.get(4)?,
            created_at: row.get(5)?,
        })
    })
    .optional()
}

fn group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        avatar_url: row.get(3)?,
        created_by: row.get(4)?,
        created_by_name: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_types::DEFAULT_GROUP_ID;

    fn db_with_user(user_id: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user(user_id, "user_abc123def", "Alice", false)
            .unwrap();
        db
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            crate::migrations::run(conn)?;
            Ok(())
        })
        .unwrap();
        // Default group seeded exactly once
        let groups = db.list_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, DEFAULT_GROUP_ID.to_string());
        assert_eq!(groups[0].name, "general");
    }

    #[test]
    fn insert_then_history_round_trips_in_order() {
        let db = db_with_user("u1");
        let gid = DEFAULT_GROUP_ID.to_string();

        let first = db.insert_message(&gid, "u1", "hello", "text").unwrap();
        let second = db.insert_message(&gid, "u1", "world", "text").unwrap();
        assert!(first.id < second.id);

        let history = db.fetch_history(&gid).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message.id, first.id);
        assert_eq!(history[0].message.body, "hello");
        assert_eq!(history[0].message.user_id, "u1");
        assert_eq!(history[1].message.body, "world");
        assert_eq!(history[0].display_name, "Alice");
        assert!(!history[0].is_anonymous);
    }

    #[test]
    fn membership_pair_is_unique() {
        let db = db_with_user("u1");
        let gid = DEFAULT_GROUP_ID.to_string();

        db.add_group_member(&gid, "u1").unwrap();
        db.add_group_member(&gid, "u1").unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                    [&gid, "u1"],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn user_and_membership_are_created_together() {
        let db = Database::open_in_memory().unwrap();
        let gid = DEFAULT_GROUP_ID.to_string();

        db.create_user_in_group("u1", "user_abc123def", "Alice", false, &gid)
            .unwrap();

        assert!(db.get_user_by_id("u1").unwrap().is_some());
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                    [&gid, "u1"],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn failed_membership_rolls_back_the_user() {
        let db = Database::open_in_memory().unwrap();

        // Unknown group violates the membership FK after the user insert
        let result =
            db.create_user_in_group("u1", "user_abc123def", "Alice", false, "no-such-group");
        assert!(result.is_err());
        assert!(db.get_user_by_id("u1").unwrap().is_none());
    }

    #[test]
    fn unknown_user_lookup_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_user_by_id("nope").unwrap().is_none());
    }

    #[test]
    fn anonymous_flag_survives_to_history() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u2", "anon_xyz987abc", "Bob", true).unwrap();
        let gid = DEFAULT_GROUP_ID.to_string();
        db.insert_message(&gid, "u2", "hi", "text").unwrap();

        let history = db.fetch_history(&gid).unwrap();
        assert!(history[0].is_anonymous);
    }
}
