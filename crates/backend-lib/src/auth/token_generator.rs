// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
/** Secure token generation for sessions
Session ids and CSRF tokens are both drawn from OS entropy and encoded
URL-safe so they can travel in cookies, headers and file names unchanged. */
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

/// Random bytes behind a session id (256 bits of entropy)
pub const SESSION_ID_BYTES: usize = 32;

/// Random bytes behind a CSRF token
pub const CSRF_TOKEN_BYTES: usize = 32;

/// Generate a fresh session id
pub fn generate_session_id() -> String {
    generate_secure_token_with_size(SESSION_ID_BYTES)
}

/// Generate a fresh CSRF token
pub fn generate_csrf_token() -> String {
    generate_secure_token_with_size(CSRF_TOKEN_BYTES)
}

/** Generate a cryptographically secure random token with specified size
# Arguments
* `bytes` - The size of the random token in bytes
# Returns
A base64 URL-safe encoded string without padding */
pub fn generate_secure_token_with_size(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}

/// Longest token accepted back from a client; generated ones are 43 chars
pub const MAX_TOKEN_LENGTH: usize = 128;

/// True if `token` is non-empty, at most `MAX_TOKEN_LENGTH` long and only
/// uses the URL-safe base64 alphabet.
pub fn is_well_formed(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LENGTH
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
