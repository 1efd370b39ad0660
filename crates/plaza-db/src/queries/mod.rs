mod messages;
mod notifications;
mod posts;
mod users;

pub use users::ProfileChanges;

use anyhow::Result;

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

/// Ids bound per batched `IN (...)` lookup. SQLite caps bound variables at 32766.
const MAX_BATCH: usize = 500;

/// `?1, ?2, ..., ?n` for batched `IN (...)` lookups.
fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

fn as_params(values: &[String]) -> Vec<&dyn rusqlite::types::ToSql> {
    values
        .iter()
        .map(|v| v as &dyn rusqlite::types::ToSql)
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use uuid::Uuid;

    use crate::Database;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    /// Create a user named `username` and return its id.
    pub fn user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(
            &id,
            username,
            &format!("{}@example.com", username),
            &username.to_uppercase(),
            "hash",
        )
        .unwrap();
        id
    }

    pub fn post(db: &Database, user_id: &str, text: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_post(&id, user_id, Some(text), None).unwrap();
        id
    }
}
