use serde::{Deserialize, Serialize};

use super::repo_types::Account;

/// Body of create and update requests. Missing fields arrive empty and are
/// rejected by validation.
#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
}

/// Public part of the account returned to the client.
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<Account> for AccountView {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            username: a.username,
            email: a.email,
        }
    }
}
