use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::models::UserRow;
use crate::{Database, now_timestamp};

const USER_COLUMNS: &str = "id, username, email, full_name, password, profile_img, cover_img, bio, link, created_at, updated_at";

/// Profile fields to overwrite. `None` leaves the stored value alone.
#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub link: Option<String>,
    pub profile_img: Option<String>,
    pub cover_img: Option<String>,
    pub password_hash: Option<String>,
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        full_name: &str,
        password_hash: &str,
    ) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, full_name, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![id, username, email, full_name, password_hash, now],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn update_user(&self, id: &str, changes: &ProfileChanges) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET
                    full_name   = COALESCE(?2, full_name),
                    email       = COALESCE(?3, email),
                    username    = COALESCE(?4, username),
                    bio         = COALESCE(?5, bio),
                    link        = COALESCE(?6, link),
                    profile_img = COALESCE(?7, profile_img),
                    cover_img   = COALESCE(?8, cover_img),
                    password    = COALESCE(?9, password),
                    updated_at  = ?10
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    changes.full_name,
                    changes.email,
                    changes.username,
                    changes.bio,
                    changes.link,
                    changes.profile_img,
                    changes.cover_img,
                    changes.password_hash,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    // -- Follows --

    /// Follow if not following, unfollow otherwise.
    /// Returns true when the call left `follower_id` following `followee_id`.
    pub fn toggle_follow(&self, follower_id: &str, followee_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                [follower_id, followee_id],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![follower_id, followee_id, now_timestamp()],
                )?;
            }
            tx.commit()?;
            Ok(removed == 0)
        })
    }

    pub fn get_follower_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            query_ids(
                conn,
                "SELECT follower_id FROM follows WHERE followee_id = ?1 ORDER BY created_at, rowid",
                user_id,
            )
        })
    }

    pub fn get_following_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            query_ids(
                conn,
                "SELECT followee_id FROM follows WHERE follower_id = ?1 ORDER BY created_at, rowid",
                user_id,
            )
        })
    }

    pub fn get_liked_post_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            query_ids(
                conn,
                "SELECT post_id FROM post_likes WHERE user_id = ?1 ORDER BY created_at, rowid",
                user_id,
            )
        })
    }

    /// Random sample of users that `user_id` does not follow, excluding itself.
    pub fn get_suggested_users(&self, user_id: &str, limit: u32) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE id != ?1
                   AND id NOT IN (SELECT followee_id FROM follows WHERE follower_id = ?1)
                 ORDER BY RANDOM()
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        password: row.get(4)?,
        profile_img: row.get(5)?,
        cover_img: row.get(6)?,
        bio: row.get(7)?,
        link: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// `column` is always one of our own literals, never client input.
fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], map_user).optional()?;
    Ok(row)
}

fn query_ids(conn: &Connection, sql: &str, param: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([param], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};

    use super::ProfileChanges;

    #[test]
    fn follow_toggles_and_keeps_both_sides_consistent() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        assert!(db.toggle_follow(&alice, &bob).unwrap());
        assert_eq!(db.get_following_ids(&alice).unwrap(), vec![bob.clone()]);
        assert_eq!(db.get_follower_ids(&bob).unwrap(), vec![alice.clone()]);

        assert!(!db.toggle_follow(&alice, &bob).unwrap());
        assert!(db.get_following_ids(&alice).unwrap().is_empty());
        assert!(db.get_follower_ids(&bob).unwrap().is_empty());
    }

    #[test]
    fn self_follow_is_rejected_by_the_schema() {
        let db = db();
        let alice = user(&db, "alice");
        assert!(db.toggle_follow(&alice, &alice).is_err());
        assert!(db.get_following_ids(&alice).unwrap().is_empty());
    }

    #[test]
    fn duplicate_username_or_email_fails() {
        let db = db();
        user(&db, "alice");
        assert!(db.create_user("x", "alice", "other@example.com", "A", "h").is_err());
        assert!(db.create_user("y", "alice2", "alice@example.com", "A", "h").is_err());
    }

    #[test]
    fn update_only_touches_given_fields() {
        let db = db();
        let alice = user(&db, "alice");
        db.update_user(
            &alice,
            &ProfileChanges {
                bio: Some("hello".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let row = db.get_user_by_id(&alice).unwrap().unwrap();
        assert_eq!(row.bio, "hello");
        assert_eq!(row.username, "alice");
        assert_eq!(row.email, "alice@example.com");
        assert!(row.updated_at >= row.created_at);
    }

    #[test]
    fn suggestions_skip_self_and_followed() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");
        db.toggle_follow(&alice, &bob).unwrap();

        let ids: Vec<String> = db
            .get_suggested_users(&alice, 10)
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec![carol]);
    }

    #[test]
    fn lookups_by_each_key() {
        let db = db();
        let alice = user(&db, "alice");
        assert!(db.user_exists(&alice).unwrap());
        assert!(!db.user_exists("nobody").unwrap());
        assert_eq!(db.get_user_by_username("alice").unwrap().unwrap().id, alice);
        assert_eq!(
            db.get_user_by_email("alice@example.com").unwrap().unwrap().id,
            alice
        );
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }
}
