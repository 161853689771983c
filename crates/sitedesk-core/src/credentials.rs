//! Password hashing, session tokens and time-based one-time codes.
//!
//! Password hashes are `pbkdf2-sha256$<rounds>$<salt>$<digest>` with base64
//! parts. OTP codes follow RFC 6238 with HMAC-SHA256 and six digits.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::Hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, TOTP};

use crate::error::{Result, SiteError};

const HASH_SCHEME: &str = "pbkdf2-sha256";
const HASH_ROUNDS: u32 = 10_000;
const HASH_LEN: usize = 32;
const OTP_DIGITS: usize = 6;

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

fn derive(salt: &[u8], password: &str, rounds: u32) -> Option<[u8; HASH_LEN]> {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, rounds, &mut out).ok()?;
    Some(out)
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = random_bytes::<16>();
    let digest = derive(&salt, password, HASH_ROUNDS)
        .ok_or_else(|| SiteError::Internal("password key derivation failed".into()))?;
    Ok(format!(
        "{HASH_SCHEME}${HASH_ROUNDS}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(digest)
    ))
}

/// Malformed stored hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(rounds), Some(salt), Some(digest), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let (Ok(rounds), Ok(salt), Ok(expected)) = (
        rounds.parse::<u32>(),
        STANDARD.decode(salt),
        STANDARD.decode(digest),
    ) else {
        return false;
    };
    derive(&salt, password, rounds).is_some_and(|got| bool::from(got[..].ct_eq(&expected)))
}

/// A fresh bearer token. Only its [`token_digest`] is persisted.
pub fn new_token() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<32>())
}

/// Short random identifier for a client/device.
pub fn new_client_id() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<12>())
}

pub fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

pub fn new_otp_secret() -> String {
    STANDARD.encode(random_bytes::<20>())
}

/// `None` when the stored secret is not base64 or too short for RFC 6238.
fn totp(secret: &str, step_secs: u64, drift_steps: u64) -> Option<TOTP> {
    let key = STANDARD.decode(secret).ok()?;
    let skew = u8::try_from(drift_steps).unwrap_or(u8::MAX);
    TOTP::new(Algorithm::SHA256, OTP_DIGITS, skew, step_secs.max(1), key).ok()
}

/// Current code for `secret` at `unix_secs`.
pub fn totp_now(secret: &str, unix_secs: u64, step_secs: u64) -> Option<String> {
    Some(totp(secret, step_secs, 0)?.generate(unix_secs))
}

/// Accepts codes up to `drift_steps` steps away from `unix_secs`.
pub fn totp_verify(
    secret: &str,
    code: &str,
    unix_secs: u64,
    step_secs: u64,
    drift_steps: u64,
) -> bool {
    totp(secret, step_secs, drift_steps).is_some_and(|t| t.check(code.trim(), unix_secs))
}
