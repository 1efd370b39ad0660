use anyhow::Result;
use rusqlite::{Connection, Row};

use super::{MAX_BATCH, OptionalExt, as_params, placeholders};
use crate::models::{CommentRow, LikeRow, PostRow};
use crate::{Database, now_timestamp};

const POST_SELECT: &str = "SELECT p.id, p.user_id, u.username, u.full_name, u.profile_img, p.text, p.img, p.created_at
     FROM posts p
     JOIN users u ON p.user_id = u.id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.user_id, u.username, u.full_name, u.profile_img, c.text, c.created_at
     FROM comments c
     JOIN users u ON c.user_id = u.id";

impl Database {
    // -- Posts --

    pub fn create_post(
        &self,
        id: &str,
        user_id: &str,
        text: Option<&str>,
        img: Option<&str>,
    ) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, user_id, text, img, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, user_id, text, img, now],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} WHERE p.id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([id], map_post).optional()?;
            Ok(row)
        })
    }

    /// Deletes the post; likes and comments cascade.
    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id])? > 0))
    }

    pub fn get_all_posts(&self) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| query_posts(conn, "", &[]))
    }

    /// Posts authored by anyone `user_id` follows.
    pub fn get_following_posts(&self, user_id: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            query_posts(
                conn,
                "WHERE p.user_id IN (SELECT followee_id FROM follows WHERE follower_id = ?1)",
                &[&user_id],
            )
        })
    }

    pub fn get_liked_posts(&self, user_id: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            query_posts(
                conn,
                "WHERE p.id IN (SELECT post_id FROM post_likes WHERE user_id = ?1)",
                &[&user_id],
            )
        })
    }

    pub fn get_user_posts(&self, user_id: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| query_posts(conn, "WHERE p.user_id = ?1", &[&user_id]))
    }

    // -- Likes --

    /// Like if not liked, unlike otherwise. Returns true when the post is now liked.
    pub fn toggle_like(&self, post_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
                [post_id, user_id],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![post_id, user_id, now_timestamp()],
                )?;
            }
            tx.commit()?;
            Ok(removed == 0)
        })
    }

    pub fn get_post_likes(&self, post_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT user_id FROM post_likes WHERE post_id = ?1 ORDER BY created_at, rowid")?;
            let ids = stmt
                .query_map([post_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Batch-fetch likes for a set of post IDs. Large sets are queried in
    /// chunks; a post's likes always land in one chunk.
    pub fn get_likes_for_posts(&self, post_ids: &[String]) -> Result<Vec<LikeRow>> {
        self.with_conn(|conn| {
            let mut likes = Vec::new();
            for chunk in post_ids.chunks(MAX_BATCH) {
                let sql = format!(
                    "SELECT post_id, user_id FROM post_likes WHERE post_id IN ({}) ORDER BY created_at, rowid",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(as_params(chunk).as_slice(), |row| {
                    Ok(LikeRow {
                        post_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?;
                for row in rows {
                    likes.push(row?);
                }
            }
            Ok(likes)
        })
    }

    // -- Comments --

    pub fn add_comment(&self, id: &str, post_id: &str, user_id: &str, text: &str) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, user_id, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, post_id, user_id, text, now],
            )?;
            Ok(())
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!("{COMMENT_SELECT} WHERE c.id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([id], map_comment).optional()?;
            Ok(row)
        })
    }

    pub fn delete_comment(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM comments WHERE id = ?1", [id])? > 0))
    }

    /// Batch-fetch comments for a set of post IDs, oldest first within each post.
    pub fn get_comments_for_posts(&self, post_ids: &[String]) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut comments = Vec::new();
            for chunk in post_ids.chunks(MAX_BATCH) {
                let sql = format!(
                    "{COMMENT_SELECT} WHERE c.post_id IN ({}) ORDER BY c.created_at ASC, c.rowid ASC",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                for row in stmt.query_map(as_params(chunk).as_slice(), map_comment)? {
                    comments.push(row?);
                }
            }
            Ok(comments)
        })
    }
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_username: row.get(2)?,
        author_full_name: row.get(3)?,
        author_profile_img: row.get(4)?,
        text: row.get(5)?,
        img: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        author_username: row.get(3)?,
        author_full_name: row.get(4)?,
        author_profile_img: row.get(5)?,
        text: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Newest first. `filter` is one of the literals above.
fn query_posts(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<PostRow>> {
    let sql = format!("{POST_SELECT} {filter} ORDER BY p.created_at DESC, p.rowid DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, map_post)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, post, user};

    #[test]
    fn like_toggles() {
        let db = db();
        let alice = user(&db, "alice");
        let p = post(&db, &alice, "hello");

        assert!(db.toggle_like(&p, &alice).unwrap());
        assert_eq!(db.get_post_likes(&p).unwrap(), vec![alice.clone()]);
        assert_eq!(db.get_liked_post_ids(&alice).unwrap(), vec![p.clone()]);

        assert!(!db.toggle_like(&p, &alice).unwrap());
        assert!(db.get_post_likes(&p).unwrap().is_empty());
    }

    #[test]
    fn post_needs_text_or_image() {
        let db = db();
        let alice = user(&db, "alice");
        assert!(db.create_post("p1", &alice, None, None).is_err());
        db.create_post("p2", &alice, None, Some("https://img/1.png")).unwrap();
        let row = db.get_post("p2").unwrap().unwrap();
        assert_eq!(row.img.as_deref(), Some("https://img/1.png"));
        assert_eq!(row.author_username, "alice");
    }

    #[test]
    fn feeds_filter_and_sort_newest_first() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");

        let b1 = post(&db, &bob, "first");
        let c1 = post(&db, &carol, "carol's");
        let b2 = post(&db, &bob, "second");

        db.toggle_follow(&alice, &bob).unwrap();
        let following: Vec<String> = db
            .get_following_posts(&alice)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(following, vec![b2.clone(), b1.clone()]);

        let all: Vec<String> = db.get_all_posts().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(all, vec![b2.clone(), c1.clone(), b1.clone()]);

        db.toggle_like(&c1, &alice).unwrap();
        let liked: Vec<String> = db
            .get_liked_posts(&alice)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(liked, vec![c1]);

        assert_eq!(db.get_user_posts(&bob).unwrap().len(), 2);
    }

    #[test]
    fn deleting_a_post_cascades() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let p = post(&db, &alice, "bye");
        db.toggle_like(&p, &bob).unwrap();
        db.add_comment("c1", &p, &bob, "nice").unwrap();

        assert!(db.delete_post(&p).unwrap());
        assert!(db.get_post(&p).unwrap().is_none());
        assert!(db.get_comment("c1").unwrap().is_none());
        assert!(db.get_liked_post_ids(&bob).unwrap().is_empty());
        assert!(!db.delete_post(&p).unwrap());
    }

    #[test]
    fn comments_batch_in_order() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let p = post(&db, &alice, "thread");
        db.add_comment("c1", &p, &bob, "one").unwrap();
        db.add_comment("c2", &p, &alice, "two").unwrap();

        let rows = db.get_comments_for_posts(&[p.clone()]).unwrap();
        let texts: Vec<&str> = rows.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(rows[0].author_username, "bob");

        assert!(db.delete_comment("c1").unwrap());
        assert_eq!(db.get_comments_for_posts(&[p]).unwrap().len(), 1);
    }

    #[test]
    fn batched_lookups_span_more_ids_than_one_query_binds() {
        let db = db();
        let alice = user(&db, "alice");
        let ids: Vec<String> = (0..super::MAX_BATCH * 2 + 1)
            .map(|i| post(&db, &alice, &format!("post {}", i)))
            .collect();

        let first = &ids[0];
        let last = &ids[ids.len() - 1];
        db.toggle_like(first, &alice).unwrap();
        db.toggle_like(last, &alice).unwrap();
        db.add_comment("c-first", first, &alice, "one").unwrap();
        db.add_comment("c-last", last, &alice, "two").unwrap();

        let liked: Vec<String> = db
            .get_likes_for_posts(&ids)
            .unwrap()
            .into_iter()
            .map(|l| l.post_id)
            .collect();
        assert_eq!(liked.len(), 2);
        assert!(liked.contains(first) && liked.contains(last));

        let commented: Vec<String> = db
            .get_comments_for_posts(&ids)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(commented.len(), 2);
        assert!(commented.contains(&"c-first".to_string()));
        assert!(commented.contains(&"c-last".to_string()));
    }
}
