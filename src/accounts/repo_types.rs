use serde::Serialize;
use sqlx::FromRow;

/// Account row in the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Account {
    pub id: i64,                  // assigned by the store on insert
    pub username: String,         // unique, case-sensitive
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,    // Argon2 PHC string, never exposed in JSON
}

/// Account fields before the store has assigned an id.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

impl NewAccount {
    pub fn into_account(self, id: i64) -> Account {
        Account {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
        }
    }
}
