//! Session identity as seen by the sync core.
//!
//! The core never authenticates anyone. It only branches on whether the
//! session carries a stable user identifier.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Who the current session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "userId", rename_all = "snake_case")]
pub enum Identity {
    /// No stable identifier; state is scoped to the local device.
    #[default]
    Anonymous,
    /// Bound to a stable user identifier.
    Authenticated(UserId),
}

impl Identity {
    /// The stable user identifier, if the session is authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(id) => Some(id),
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl From<Option<UserId>> for Identity {
    fn from(user: Option<UserId>) -> Self {
        user.map_or(Self::Anonymous, Self::Authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_option() {
        assert_eq!(Identity::from(None), Identity::Anonymous);
        let id = UserId::new("u1");
        let identity = Identity::from(Some(id.clone()));
        assert!(identity.is_authenticated());
        assert_eq!(identity.user_id(), Some(&id));
    }
}
