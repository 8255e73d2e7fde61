/// Dual-mode password credentials
///
/// A stored credential is either a locally computed argon2id hash (`Legacy`)
/// or an opaque signature minted by the external signing authority
/// (`Signed`). On disk both live in the single `password` column; the
/// `signed:` prefix discriminates. Everything above the codec works on the
/// enum, never on raw strings.
use crate::error::{AppError, AppResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

const SIGNED_PREFIX: &str = "signed:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordCredential {
    /// argon2id PHC hash, verified locally in constant time
    Legacy { hash: String },
    /// Signature verified by the external signing authority
    Signed { signature: String },
}

impl PasswordCredential {
    /// Decode the stored column value
    pub fn decode(stored: &str) -> Self {
        match stored.strip_prefix(SIGNED_PREFIX) {
            Some(signature) => PasswordCredential::Signed {
                signature: signature.to_string(),
            },
            None => PasswordCredential::Legacy {
                hash: stored.to_string(),
            },
        }
    }

    /// Encode for storage
    pub fn encode(&self) -> String {
        match self {
            PasswordCredential::Legacy { hash } => hash.clone(),
            PasswordCredential::Signed { signature } => {
                format!("{}{}", SIGNED_PREFIX, signature)
            }
        }
    }

    /// Hash a plaintext password into a Legacy credential
    pub fn hash_legacy(plaintext: &str) -> AppResult<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok(PasswordCredential::Legacy { hash })
    }

    /// Verify a plaintext password against a Legacy hash
    pub fn verify_legacy(plaintext: &str, hash: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Stored hash is malformed: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_discriminates_on_prefix() {
        let signed = PasswordCredential::decode("signed:abc123");
        assert_eq!(
            signed,
            PasswordCredential::Signed {
                signature: "abc123".to_string()
            }
        );

        let legacy = PasswordCredential::decode("$argon2id$v=19$m=19456,t=2,p=1$salt$hash");
        assert!(matches!(legacy, PasswordCredential::Legacy { .. }));
    }

    #[test]
    fn encode_round_trips() {
        let cred = PasswordCredential::Signed {
            signature: "sig-value".to_string(),
        };
        assert_eq!(PasswordCredential::decode(&cred.encode()), cred);
    }

    #[test]
    fn legacy_hash_verifies_and_rejects() {
        let cred = PasswordCredential::hash_legacy("hunter2").unwrap();
        let PasswordCredential::Legacy { hash } = &cred else {
            panic!("expected legacy credential");
        };

        assert!(PasswordCredential::verify_legacy("hunter2", hash).unwrap());
        assert!(!PasswordCredential::verify_legacy("hunter3", hash).unwrap());
    }
}
