//! Identity of whoever is making the current request.

use serde::Serialize;

/// An authenticated viewer. Anonymous requests carry `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Viewer {
    pub user_id: i64,
    pub username: String,
}

impl Viewer {
    pub fn new(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    pub fn is(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }
}
