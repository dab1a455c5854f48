use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Length rule for passwords chosen at signup or on profile update.
/// Returns the field message when `plain` is too short.
pub fn check_password_policy(plain: &str) -> Option<String> {
    (plain.chars().count() < MIN_PASSWORD_LEN).then(|| {
        format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters.")
    })
}

fn argon2_failure(op: &str, e: argon2::password_hash::Error) -> anyhow::Error {
    error!(error = %e, op, "argon2 failure");
    anyhow::anyhow!("{op}: {e}")
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| argon2_failure("hash password", e))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| argon2_failure("parse hash", e))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_salted_and_verifiable() {
        let first = hash_password("testing1234").expect("hashing should succeed");
        let second = hash_password("testing1234").expect("hashing should succeed");
        assert_ne!(first, second);
        assert!(!first.contains("testing1234"));
        assert!(verify_password("testing1234", &first).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("testing1234").expect("hashing should succeed");
        assert!(!verify_password("wrong", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        assert!(verify_password("anything", "not-a-valid-hash").is_err());
    }

    #[test]
    fn policy_requires_minimum_length() {
        assert_eq!(
            check_password_policy("pw").as_deref(),
            Some("Ensure this field has at least 6 characters.")
        );
        assert!(check_password_policy("sixsix").is_none());
        // counted in characters, not bytes
        assert!(check_password_policy("ééééé").is_some());
    }
}
