use lounge_common::new_id;
use serde::{Deserialize, Serialize};

/// The local actor: who typing events and toggles are attributed to.
#[derive(Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// Optional Supabase Auth JWT for authenticated connections.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("avatar_ref", &self.avatar_ref)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl Identity {
    /// Anonymous identity with a fresh id.
    pub fn generate(display_name: &str) -> Self {
        Self {
            user_id: new_id(),
            display_name: display_name.to_string(),
            avatar_ref: None,
            access_token: None,
        }
    }

    /// Create an identity from a Supabase Auth session.
    pub fn from_supabase_auth(user_id: String, display_name: String, access_token: String) -> Self {
        Self {
            user_id,
            display_name,
            avatar_ref: None,
            access_token: Some(access_token),
        }
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let id = Identity::from_supabase_auth("u1".into(), "Ana".into(), "secret-jwt".into());
        let out = format!("{id:?}");
        assert!(!out.contains("secret-jwt"));
        assert!(out.contains("Ana"));
    }

    #[test]
    fn token_is_never_serialized() {
        let id = Identity::from_supabase_auth("u1".into(), "Ana".into(), "secret-jwt".into());
        let json = serde_json::to_string(&id).unwrap();
        assert!(!json.contains("secret-jwt"));
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert!(back.access_token.is_none());
    }

    #[test]
    fn generated_identities_are_distinct() {
        let a = Identity::generate("host");
        let b = Identity::generate("host").with_avatar("a.png");
        assert_ne!(a.user_id, b.user_id);
        assert_eq!(b.avatar_ref.as_deref(), Some("a.png"));
    }
}
