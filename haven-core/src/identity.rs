use serde::{Deserialize, Serialize};

/// Who is driving a pipeline operation.
///
/// Passed explicitly into every operation that needs it; nothing in the
/// pipeline reads an ambient "current user".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    User { user_id: String, email: Option<String> },
    Guest { email: String },
}

impl Actor {
    pub fn user(user_id: impl Into<String>, email: Option<String>) -> Self {
        Actor::User {
            user_id: user_id.into(),
            email: email.map(|e| e.trim().to_lowercase()),
        }
    }

    pub fn guest(email: &str) -> Self {
        Actor::Guest {
            email: email.trim().to_lowercase(),
        }
    }

    /// Key used for rate limiting and audit records.
    pub fn identifier(&self) -> &str {
        match self {
            Actor::User { user_id, .. } => user_id,
            Actor::Guest { email } => email,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::User { user_id, .. } => Some(user_id),
            Actor::Guest { .. } => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Actor::User { email, .. } => email.as_deref(),
            Actor::Guest { email } => Some(email),
        }
    }

    pub fn audit_label(&self) -> String {
        match self {
            Actor::User { user_id, .. } => format!("user:{}", user_id),
            Actor::Guest { email } => format!("guest:{}", email),
        }
    }
}
