use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role stored on the user row and carried in the token.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Unknown values degrade to `User` so a bad row never grants admin.
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,     // user ID
    pub email: String, // user email at signing time
    #[serde(default)]
    pub role: Role,
    pub iat: usize, // issued at (unix timestamp)
    pub exp: usize, // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_db_text() {
        assert_eq!(Role::from_db(Role::Admin.as_str()), Role::Admin);
        assert_eq!(Role::from_db(Role::User.as_str()), Role::User);
        assert_eq!(Role::from_db("superuser"), Role::User);
    }

    #[test]
    fn missing_role_claim_defaults_to_user() {
        let json = serde_json::json!({
            "sub": Uuid::nil(),
            "email": "a@b.io",
            "iat": 1,
            "exp": 2,
            "iss": "i",
            "aud": "a"
        });
        let claims: Claims = serde_json::from_value(json).unwrap();
        assert_eq!(claims.role, Role::User);
    }
}
