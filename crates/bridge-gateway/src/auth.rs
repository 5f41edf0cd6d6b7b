// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The `onAuth(token) -> {valid, userId?}` contract, instantiated as a
//! single shared-secret bearer token. The raw token is never persisted;
//! only its SHA-256 digest lives on disk, compared in constant time via
//! [`subtle::ConstantTimeEq`] to avoid a timing oracle on the WS auth
//! handshake.

use std::path::Path;

use anyhow::Context;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Result of a successful auth check — an opaque user identifier, carried
/// through to `onClientAuthenticated` but otherwise unused by the core.
pub const LOCAL_USER_ID: &str = "local";

pub trait Authenticator: Send + Sync {
    /// Returns `Some(userId)` if `token` is valid, `None` otherwise.
    fn authenticate(&self, token: &str) -> Option<String>;
}

/// A raw bearer token, shown to the operator exactly once at generation.
#[derive(Debug)]
#[must_use = "display this token to the operator, then call into_stored()"]
pub struct RawToken(String);

impl RawToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        RawToken(base64url_encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_stored(self) -> StoredToken {
        StoredToken(sha256(self.0.as_bytes()))
    }
}

/// The stored form of a bearer token — only the SHA-256 digest is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken(#[serde(with = "hex_bytes")] [u8; 32]);

impl StoredToken {
    pub fn verify(&self, provided: &str) -> bool {
        let provided_hash = sha256(provided.as_bytes());
        bool::from(provided_hash.ct_eq(&self.0))
    }
}

impl Authenticator for StoredToken {
    fn authenticate(&self, token: &str) -> Option<String> {
        self.verify(token).then(|| LOCAL_USER_ID.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTokenFile {
    token_hash: StoredToken,
}

/// Load the token at `path`, generating and saving a fresh one (mode 0o600
/// on Unix) if it doesn't exist yet. Returns `None` for the raw token when
/// an existing file was loaded — callers have already seen it once.
pub fn load_or_bootstrap(path: &Path) -> anyhow::Result<(StoredToken, Option<String>)> {
    if path.is_file() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading token file {}", path.display()))?;
        let file: StoredTokenFile = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing token file {}", path.display()))?;
        return Ok((file.token_hash, None));
    }

    let raw = RawToken::generate();
    let raw_str = raw.as_str().to_string();
    let stored = raw.into_stored();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating token directory {}", parent.display()))?;
    }
    let file = StoredTokenFile { token_hash: stored.clone() };
    let yaml = serde_yaml::to_string(&file).context("serializing token file")?;
    write_secret_file(path, yaml.as_bytes())?;

    Ok((stored, Some(raw_str)))
}

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn write_secret_file(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("writing secret file {}", path.display()))?;
        f.write_all(data)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data)
            .with_context(|| format!("writing secret file {}", path.display()))?;
    }
    Ok(())
}

fn base64url_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes.try_into().map_err(|_| D::Error::custom("expected 32-byte hex"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_verifies_itself() {
        let raw = RawToken::generate();
        let raw_str = raw.as_str().to_string();
        let stored = raw.into_stored();
        assert!(stored.verify(&raw_str));
    }

    #[test]
    fn stored_token_rejects_wrong_value() {
        let raw = RawToken::generate();
        let stored = raw.into_stored();
        assert!(!stored.verify("wrong-token"));
    }

    #[test]
    fn authenticator_returns_local_user_id_on_success() {
        let raw = RawToken::generate();
        let raw_str = raw.as_str().to_string();
        let stored = raw.into_stored();
        assert_eq!(stored.authenticate(&raw_str), Some(LOCAL_USER_ID.to_string()));
    }

    #[test]
    fn authenticator_returns_none_on_failure() {
        let raw = RawToken::generate();
        let stored = raw.into_stored();
        assert_eq!(stored.authenticate("nope"), None);
    }

    #[test]
    fn bootstrap_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.yaml");
        let (stored, raw) = load_or_bootstrap(&path).unwrap();
        let raw = raw.expect("fresh bootstrap returns the raw token once");
        assert!(stored.verify(&raw));

        let (reloaded, raw2) = load_or_bootstrap(&path).unwrap();
        assert!(raw2.is_none(), "an existing file never re-reveals the raw token");
        assert!(reloaded.verify(&raw));
    }
}
