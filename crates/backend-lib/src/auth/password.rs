// ============================
// crates/backend-lib/src/auth/password.rs
// ============================
//! Password hashing and verification.
//!
//! Hashes are argon2id digests encoded as
//! `$argon2id$t=<time>,m=<memory KiB>,p=<lanes>$<salt>$<digest>` with salt
//! and digest in unpadded standard base64.
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Algorithm id embedded in every hash string
pub const ALGORITHM_ID: &str = "argon2id";

/// Salt length in bytes
pub const SALT_LENGTH: usize = 32;

/// Derived key length in bytes
pub const KEY_LENGTH: usize = 32;

/// Password the decoy hash is computed from. No account is ever given it.
const DECOY_PASSWORD: &str = "foundation-decoy-password";

/// Errors raised while hashing or parsing a stored hash
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("invalid hash format")]
    InvalidFormat,

    #[error("unsupported hash type: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("failed to decode {field}: {source}")]
    InvalidEncoding {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("hashing failed: {0}")]
    Hashing(String),
}

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordParams {
    /// Number of passes over memory
    pub time_cost: u32,
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_kib: 32 * 1024, // 32 MiB
            parallelism: 4,
        }
    }
}

impl PasswordParams {
    /// Check the parameters against argon2's own limits
    pub fn validate(&self) -> Result<(), PasswordError> {
        Params::new(self.memory_kib, self.time_cost, self.parallelism, Some(KEY_LENGTH))
            .map(|_| ())
            .map_err(|e| PasswordError::InvalidParameter(e.to_string()))
    }
}

/// Hash a password with the default cost parameters
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    hash_password_with(plain, PasswordParams::default())
}

/// Hash a password with explicit cost parameters and a fresh random salt
pub fn hash_password_with(plain: &str, params: PasswordParams) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);

    let digest = derive_key(plain.as_bytes(), &salt, params, KEY_LENGTH)?;

    Ok(format!(
        "${ALGORITHM_ID}$t={},m={},p={}${}${}",
        params.time_cost,
        params.memory_kib,
        params.parallelism,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(digest),
    ))
}

/// Hash used in place of a real one when the account does not exist, so
/// both paths spend the same time in argon2.
pub fn decoy_hash(params: PasswordParams) -> Result<String, PasswordError> {
    hash_password_with(DECOY_PASSWORD, params)
}

/// Verify a password against an encoded hash.
///
/// A malformed or foreign hash is an error, never a silent mismatch.
pub fn verify_password(plain: &str, encoded: &str) -> Result<bool, PasswordError> {
    let parsed = ParsedHash::parse(encoded)?;
    let computed = derive_key(
        plain.as_bytes(),
        &parsed.salt,
        parsed.params,
        parsed.digest.len(),
    )?;

    Ok(computed.ct_eq(&parsed.digest).into())
}

struct ParsedHash {
    params: PasswordParams,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

impl ParsedHash {
    fn parse(encoded: &str) -> Result<Self, PasswordError> {
        let parts: Vec<&str> = encoded.split('$').collect();
        if parts.len() != 5 || !parts[0].is_empty() {
            return Err(PasswordError::InvalidFormat);
        }

        if parts[1] != ALGORITHM_ID {
            return Err(PasswordError::UnsupportedAlgorithm(parts[1].to_string()));
        }

        let params = parse_params(parts[2])?;

        let salt = STANDARD_NO_PAD
            .decode(parts[3])
            .map_err(|source| PasswordError::InvalidEncoding { field: "salt", source })?;
        let digest = STANDARD_NO_PAD
            .decode(parts[4])
            .map_err(|source| PasswordError::InvalidEncoding { field: "hash", source })?;

        Ok(Self { params, salt, digest })
    }
}

fn parse_params(raw: &str) -> Result<PasswordParams, PasswordError> {
    let fields: Vec<&str> = raw.split(',').collect();
    if fields.len() != 3 {
        return Err(PasswordError::InvalidParameter(format!(
            "expected 3 parameters, got {}",
            fields.len()
        )));
    }

    let (mut time, mut memory, mut lanes) = (None, None, None);
    for field in fields {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| PasswordError::InvalidParameter(field.to_string()))?;
        let value: u32 = value
            .parse()
            .map_err(|_| PasswordError::InvalidParameter(field.to_string()))?;
        match key {
            "t" => time = Some(value),
            "m" => memory = Some(value),
            "p" => lanes = Some(value),
            other => {
                return Err(PasswordError::InvalidParameter(format!(
                    "unknown parameter: {other}"
                )))
            },
        }
    }

    match (time, memory, lanes) {
        (Some(time_cost), Some(memory_kib), Some(parallelism)) => Ok(PasswordParams {
            time_cost,
            memory_kib,
            parallelism,
        }),
        _ => Err(PasswordError::InvalidParameter(
            "t, m and p must each appear once".to_string(),
        )),
    }
}

fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: PasswordParams,
    len: usize,
) -> Result<Vec<u8>, PasswordError> {
    let argon_params = Params::new(
        params.memory_kib,
        params.time_cost,
        params.parallelism,
        Some(len),
    )
    .map_err(|e| PasswordError::InvalidParameter(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = vec![0u8; len];
    argon
        .hash_password_into(password, salt, &mut out)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;
    Ok(out)
}
