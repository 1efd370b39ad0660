use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::MessageRow;
use crate::{Database, now_timestamp};

impl Database {
    // -- Direct messages --

    /// Append a message and return the stored row.
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<MessageRow> {
        let created_at = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, sender_id, receiver_id, content, created_at],
            )?;
            Ok(())
        })?;

        Ok(MessageRow {
            id: id.to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            created_at,
        })
    }

    /// Messages exchanged between two users in either direction, oldest first.
    /// `before` is a `created_at` cursor: only messages strictly older are returned.
    /// It is rendered in the stored fixed-width form so the string comparison
    /// matches time order.
    pub fn get_conversation(
        &self,
        user_a: &str,
        user_b: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageRow>> {
        let before = before.map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, created_at
                 FROM messages
                 WHERE ((sender_id = ?1 AND receiver_id = ?2)
                     OR (sender_id = ?2 AND receiver_id = ?1))
                   AND (?4 IS NULL OR created_at < ?4)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
            )?;

            let mut rows = stmt
                .query_map(rusqlite::params![user_a, user_b, limit, before], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use plaza_types::models::Message;

    use crate::models::parse_timestamp;
    use crate::queries::test_support::{db, user};
    use crate::Database;

    fn insert_at(db: &Database, id: &str, from: &str, to: &str, created_at: &str) {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, 'x', ?4)",
                [id, from, to, created_at],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn conversation_includes_both_directions_only() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");

        db.insert_message("m1", &alice, &bob, "hi bob").unwrap();
        db.insert_message("m2", &bob, &alice, "hi alice").unwrap();
        db.insert_message("m3", &carol, &alice, "hey").unwrap();

        let ids: Vec<String> = db
            .get_conversation(&alice, &bob, 50, None)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn limit_keeps_newest_and_cursor_pages_back() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        for i in 0..5 {
            db.insert_message(&format!("m{}", i), &alice, &bob, "x").unwrap();
            // distinct created_at values so the cursor splits cleanly
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let page = db.get_conversation(&alice, &bob, 2, None).unwrap();
        let ids: Vec<&str> = page.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m4"]);

        let older = db
            .get_conversation(&alice, &bob, 2, Some(parse_timestamp(&page[0].created_at)))
            .unwrap();
        let ids: Vec<&str> = older.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn cursor_from_the_wire_form_excludes_the_message_itself() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        insert_at(&db, "m0", &alice, &bob, "2024-01-01T00:00:05.000000Z");
        insert_at(&db, "m1", &alice, &bob, "2024-01-01T00:00:05.500000Z");
        insert_at(&db, "m2", &bob, &alice, "2024-01-01T00:00:05.500001Z");

        let all = db.get_conversation(&alice, &bob, 50, None).unwrap();
        let m1 = Message::from(all.into_iter().nth(1).unwrap());
        // The serialized form drops trailing zeros: "...05.500Z".
        let wire = serde_json::to_value(&m1).unwrap();
        let cursor: chrono::DateTime<chrono::Utc> =
            serde_json::from_value(wire["createdAt"].clone()).unwrap();

        let ids: Vec<String> = db
            .get_conversation(&alice, &bob, 50, Some(cursor))
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m0"]);
    }

    #[test]
    fn unknown_party_is_rejected() {
        let db = db();
        let alice = user(&db, "alice");
        assert!(db.insert_message("m1", &alice, "ghost", "hello?").is_err());
    }
}
