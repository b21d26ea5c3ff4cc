//! Credential capability shared by both login realms
//!
//! Administrators and employees live in separate tables with separate
//! username spaces. They only meet here: each is a [`Principal`] whose
//! stored hash is checked through the same [`CredentialHasher`].

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::error::{EngineError, EngineResult};
use crate::models::{AdminUser, Employee};

pub trait CredentialHasher: Send + Sync {
    fn hash(&self, raw: &str) -> EngineResult<String>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
    fn verify(&self, raw: &str, hash: &str) -> EngineResult<bool>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, raw: &str) -> EngineResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(raw.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| EngineError::Credential(e.to_string()))
    }

    fn verify(&self, raw: &str, hash: &str) -> EngineResult<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| EngineError::Credential(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(raw.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Anything that can log in with a password.
pub trait Principal {
    fn password_hash(&self) -> Option<&str>;

    fn can_login(&self) -> bool;
}

impl Principal for AdminUser {
    fn password_hash(&self) -> Option<&str> {
        Some(&self.password_hash)
    }

    fn can_login(&self) -> bool {
        self.is_active
    }
}

impl Principal for Employee {
    fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    fn can_login(&self) -> bool {
        self.is_login_active && self.is_active
    }
}

/// Verified in place of a real hash when there is nothing to check against,
/// so every failed login pays for one Argon2 run.
pub const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Check `raw` against a looked-up principal.
///
/// A missing principal, a disabled one, one without a password and a wrong
/// password all yield [`EngineError::InvalidCredentials`].
pub fn check_credentials<P: Principal>(
    hasher: &dyn CredentialHasher,
    principal: Option<&P>,
    raw: &str,
) -> EngineResult<()> {
    let hash = principal
        .filter(|p| p.can_login())
        .and_then(|p| p.password_hash());
    let Some(hash) = hash else {
        let _ = hasher.verify(raw, DUMMY_HASH);
        return Err(EngineError::InvalidCredentials);
    };

    match hasher.verify(raw, hash) {
        Ok(true) => Ok(()),
        Ok(false) => Err(EngineError::InvalidCredentials),
        Err(e) => {
            tracing::error!("Stored password hash could not be parsed: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    fn admin(hash: String, is_active: bool) -> AdminUser {
        AdminUser {
            id: Uuid::new_v4(),
            username: "hr-admin".to_string(),
            email: "hr@example.com".to_string(),
            password_hash: hash,
            display_name: None,
            is_active,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_argon2_round_trip() {
        let hasher = Argon2Hasher;
        let hash = hasher.hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(hasher.verify("correct horse", &hash).unwrap());
        assert!(!hasher.verify("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_argon2_rejects_garbage_hash() {
        assert!(matches!(
            Argon2Hasher.verify("x", "not-a-hash"),
            Err(EngineError::Credential(_))
        ));
    }

    #[test]
    fn test_unknown_and_wrong_password_are_indistinguishable() {
        let hasher = Argon2Hasher;
        let user = admin(hasher.hash("secret1").unwrap(), true);

        let unknown = check_credentials::<AdminUser>(&hasher, None, "secret1");
        let wrong = check_credentials(&hasher, Some(&user), "nope");
        assert!(matches!(unknown, Err(EngineError::InvalidCredentials)));
        assert!(matches!(wrong, Err(EngineError::InvalidCredentials)));
        assert_eq!(
            unknown.unwrap_err().to_string(),
            wrong.unwrap_err().to_string()
        );
        assert_ok!(check_credentials(&hasher, Some(&user), "secret1"));
    }

    #[derive(Default)]
    struct CountingHasher {
        verified: AtomicUsize,
    }

    impl CredentialHasher for CountingHasher {
        fn hash(&self, raw: &str) -> EngineResult<String> {
            Ok(raw.to_string())
        }

        fn verify(&self, raw: &str, hash: &str) -> EngineResult<bool> {
            self.verified.fetch_add(1, Ordering::SeqCst);
            Ok(raw == hash)
        }
    }

    #[test]
    fn test_dummy_hash_is_a_valid_argon2_hash() {
        assert!(!Argon2Hasher.verify("secret1", DUMMY_HASH).unwrap());
    }

    #[test]
    fn test_every_failed_login_runs_the_hasher() {
        let hasher = CountingHasher::default();
        let disabled = admin("secret1".to_string(), false);
        let user = admin("secret1".to_string(), true);

        assert_err!(check_credentials::<AdminUser>(&hasher, None, "secret1"));
        assert_err!(check_credentials(&hasher, Some(&disabled), "secret1"));
        assert_err!(check_credentials(&hasher, Some(&user), "nope"));
        assert_eq!(hasher.verified.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_inactive_principal_cannot_login() {
        let hasher = Argon2Hasher;
        let user = admin(hasher.hash("secret1").unwrap(), false);
        assert_err!(check_credentials(&hasher, Some(&user), "secret1"));
    }
}
