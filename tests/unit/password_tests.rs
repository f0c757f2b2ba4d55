// ============================
// tests/unit/password_tests.rs
// ============================
//! Unit tests for password hashing and verification
use foundation_backend_lib::auth::password::{
    hash_password_with, verify_password, PasswordError, PasswordParams,
};
use foundation_tests::test_utils::TEST_PASSWORD_PARAMS;

#[test]
fn test_hash_then_verify() {
    for password in ["SecureP@ssw0rd", "", "ünïcødé pässwörd", " leading space"] {
        let hash = hash_password_with(password, TEST_PASSWORD_PARAMS).unwrap();
        assert!(verify_password(password, &hash).unwrap(), "{password:?}");
    }
}

#[test]
fn test_same_password_hashes_differently() {
    let first = hash_password_with("SecureP@ssw0rd", TEST_PASSWORD_PARAMS).unwrap();
    let second = hash_password_with("SecureP@ssw0rd", TEST_PASSWORD_PARAMS).unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_other_password_does_not_verify() {
    let pairs = [("alpha", "beta"), ("password", "Password"), ("abc", "abc ")];
    for (stored, attempt) in pairs {
        let hash = hash_password_with(stored, TEST_PASSWORD_PARAMS).unwrap();
        assert!(!verify_password(attempt, &hash).unwrap());
    }
}

#[test]
fn test_hash_records_its_parameters() {
    let params = PasswordParams {
        time_cost: 2,
        memory_kib: 128,
        parallelism: 2,
    };
    let hash = hash_password_with("pw", params).unwrap();
    assert!(hash.starts_with("$argon2id$t=2,m=128,p=2$"));
    // Verification reads the cost from the hash, not from defaults
    assert!(verify_password("pw", &hash).unwrap());
}

#[test]
fn test_malformed_hashes_are_errors() {
    assert!(matches!(
        verify_password("pw", "not a hash"),
        Err(PasswordError::InvalidFormat)
    ));
    assert!(matches!(
        verify_password("pw", "$bcrypt$t=1,m=64,p=1$c2FsdA$aGFzaA"),
        Err(PasswordError::UnsupportedAlgorithm(_))
    ));
    assert!(matches!(
        verify_password("pw", "$argon2id$t=1,m=64$c2FsdA$aGFzaA"),
        Err(PasswordError::InvalidParameter(_))
    ));
    assert!(matches!(
        verify_password("pw", "$argon2id$t=1,m=64,p=1$!!!$aGFzaA"),
        Err(PasswordError::InvalidEncoding { field: "salt", .. })
    ));
    assert!(matches!(
        verify_password("pw", "$argon2id$t=1,m=64,p=1$c2FsdA$!!!"),
        Err(PasswordError::InvalidEncoding { field: "hash", .. })
    ));
}
