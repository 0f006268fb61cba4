use lazy_static::lazy_static;
use regex::Regex;
use tracing::error;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Checks the password policy and returns one message per failed rule.
/// An empty vector means the password is acceptable.
pub fn check_policy(password: &str) -> Vec<String> {
    let mut failures = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        failures.push(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        failures.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        failures.push(format!(
            "Password must contain at least one special character ({})",
            SPECIAL_CHARS
        ));
    }
    failures
}

pub fn hash_password(plain: &str, cost: u32) -> anyhow::Result<String> {
    bcrypt::hash(plain, cost).map_err(|e| {
        error!(error = %e, "bcrypt hash error");
        anyhow::anyhow!(e.to_string())
    })
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    bcrypt::verify(plain, hash).map_err(|e| {
        error!(error = %e, "bcrypt verify error");
        anyhow::anyhow!(e.to_string())
    })
}

/// bcrypt is CPU bound; keep it off the async workers.
pub async fn hash_blocking(plain: String, cost: u32) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain, cost)).await?
}

pub async fn verify_blocking(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await?
}
