use serde::{Deserialize, Serialize};

/// Authenticated caller as resolved from the bearer token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorIdentity {
    pub user_id: String,
    pub username: String,
}

impl ActorIdentity {
    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            user_id: user_id.clone(),
            username: user_id,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.username.trim().is_empty() {
            &self.user_id
        } else {
            &self.username
        }
    }
}
