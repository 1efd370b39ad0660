use anyhow::Result;

use plaza_types::models::NotificationKind;

use crate::models::NotificationRow;
use crate::{Database, now_timestamp};

impl Database {
    // -- Notifications --

    pub fn insert_notification(
        &self,
        id: &str,
        from_id: &str,
        to_id: &str,
        kind: NotificationKind,
        post_id: Option<&str>,
    ) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, from_id, to_id, kind, post_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, from_id, to_id, kind.as_str(), post_id, now],
            )?;
            Ok(())
        })
    }

    /// Notifications addressed to `to_id`, newest first, with sender details.
    pub fn get_notifications(&self, to_id: &str) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT n.id, n.from_id, u.username, u.full_name, u.profile_img,
                        n.to_id, n.kind, n.read, n.post_id, n.created_at
                 FROM notifications n
                 JOIN users u ON n.from_id = u.id
                 WHERE n.to_id = ?1
                 ORDER BY n.created_at DESC, n.rowid DESC",
            )?;

            let rows = stmt
                .query_map([to_id], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        from_id: row.get(1)?,
                        from_username: row.get(2)?,
                        from_full_name: row.get(3)?,
                        from_profile_img: row.get(4)?,
                        to_id: row.get(5)?,
                        kind: row.get(6)?,
                        read: row.get(7)?,
                        post_id: row.get(8)?,
                        created_at: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn mark_notifications_read(&self, to_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET read = 1 WHERE to_id = ?1 AND read = 0",
                [to_id],
            )?)
        })
    }

    pub fn delete_notifications(&self, to_id: &str) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM notifications WHERE to_id = ?1", [to_id])?))
    }

    /// Deletes one notification, but only if it is addressed to `to_id`.
    pub fn delete_notification(&self, id: &str, to_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND to_id = ?2",
                [id, to_id],
            )? > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use plaza_types::models::NotificationKind;

    use crate::queries::test_support::{db, post, user};

    #[test]
    fn insert_list_and_mark_read() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let p = post(&db, &bob, "hi");

        db.insert_notification("n1", &alice, &bob, NotificationKind::Follow, None).unwrap();
        db.insert_notification("n2", &alice, &bob, NotificationKind::Like, Some(&p)).unwrap();

        let rows = db.get_notifications(&bob).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "n2");
        assert_eq!(rows[0].kind, "like");
        assert_eq!(rows[0].post_id.as_deref(), Some(p.as_str()));
        assert_eq!(rows[0].from_username, "alice");
        assert!(rows.iter().all(|n| !n.read));
        assert!(db.get_notifications(&alice).unwrap().is_empty());

        assert_eq!(db.mark_notifications_read(&bob).unwrap(), 2);
        assert!(db.get_notifications(&bob).unwrap().iter().all(|n| n.read));
        assert_eq!(db.mark_notifications_read(&bob).unwrap(), 0);
    }

    #[test]
    fn deleting_a_post_clears_the_reference() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let p = post(&db, &bob, "hi");
        db.insert_notification("n1", &alice, &bob, NotificationKind::Comment, Some(&p)).unwrap();

        db.delete_post(&p).unwrap();
        let rows = db.get_notifications(&bob).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].post_id.is_none());
    }

    #[test]
    fn deletes_are_scoped_to_the_recipient() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        db.insert_notification("n1", &alice, &bob, NotificationKind::Follow, None).unwrap();
        db.insert_notification("n2", &bob, &alice, NotificationKind::Follow, None).unwrap();

        assert!(!db.delete_notification("n1", &alice).unwrap());
        assert!(db.delete_notification("n1", &bob).unwrap());
        assert_eq!(db.delete_notifications(&alice).unwrap(), 1);
        assert!(db.get_notifications(&alice).unwrap().is_empty());
    }
}
