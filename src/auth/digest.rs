//! HTTP Digest authentication (RFC 2617, with RFC 7616 SHA-256).
//!
//! The gate issues nonces, remembers them for a bounded time and checks the
//! `Authorization` header of every request. The per-user secret fed into HA1
//! is the stored `salt$hash` credential string, so plaintext passwords never
//! need to be kept on the device.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use constant_time_eq::constant_time_eq;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::Md5;
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::auth::credentials::CredentialStore;
use crate::auth::password::verify_password;
use crate::error::{Error, Result};
use crate::http::request::Request;

pub const NONCE_LEN: usize = 16;
pub const MAX_OUTSTANDING_NONCES: usize = 1024;
const MAX_AUTH_HEADER_LEN: usize = 4096;

/// Hash functions a client may pick in the `algorithm` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("MD5") {
            Some(DigestAlgorithm::Md5)
        } else if value.eq_ignore_ascii_case("SHA-256") {
            Some(DigestAlgorithm::Sha256)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha256 => "SHA-256",
        }
    }

    /// Lower-case hex digest of `data`.
    pub fn hash(&self, data: &str) -> String {
        match self {
            DigestAlgorithm::Md5 => hex::encode(Md5::digest(data.as_bytes())),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data.as_bytes())),
        }
    }
}

/// Parameters of a `Digest` credential or challenge.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DigestParams {
    params: HashMap<String, String>,
}

impl DigestParams {
    /// Parses `key=value, key="quoted, value", ...`.
    ///
    /// Keys are case-insensitive. Quoted values may contain commas and
    /// backslash escapes.
    pub fn parse(input: &str) -> Result<Self> {
        let mut params = HashMap::new();
        let mut rest = input.trim();

        while !rest.is_empty() {
            let eq = rest
                .find('=')
                .ok_or_else(|| Error::ParseFailure("digest parameter without value".to_string()))?;
            let key = rest[..eq].trim().to_ascii_lowercase();
            if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
                return Err(Error::ParseFailure("invalid digest parameter name".to_string()));
            }
            rest = rest[eq + 1..].trim_start();

            let value;
            if let Some(quoted) = rest.strip_prefix('"') {
                let mut out = String::new();
                let mut chars = quoted.char_indices();
                let mut end = None;
                while let Some((i, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => out.push(escaped),
                            None => break,
                        },
                        '"' => {
                            end = Some(i);
                            break;
                        }
                        _ => out.push(c),
                    }
                }
                let end = end
                    .ok_or_else(|| Error::ParseFailure("unterminated quoted string".to_string()))?;
                value = out;
                rest = quoted[end + 1..].trim_start();
            } else {
                let end = rest.find(',').unwrap_or(rest.len());
                value = rest[..end].trim().to_string();
                rest = &rest[end..];
            }

            if params.insert(key, value).is_some() {
                return Err(Error::ParseFailure("repeated digest parameter".to_string()));
            }

            rest = match rest.strip_prefix(',') {
                Some(next) => next.trim_start(),
                None if rest.is_empty() => rest,
                None => {
                    return Err(Error::ParseFailure("expected ',' between digest parameters".to_string()));
                }
            };
        }

        Ok(Self { params })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::ParseFailure(format!("digest parameter '{}' missing", key)))
    }
}

#[derive(Debug)]
struct NonceEntry {
    issued: Instant,
    /// Highest nonce-count seen with this nonce
    last_nc: u32,
}

/// The authentication gate in front of the dispatcher.
#[derive(Debug)]
pub struct DigestAuth {
    realm: String,
    nonce_validity: Duration,
    allow_basic: bool,
    credentials: Arc<CredentialStore>,
    nonces: Mutex<HashMap<String, NonceEntry>>,
}

impl DigestAuth {
    pub fn new(realm: impl Into<String>, nonce_validity: Duration, credentials: Arc<CredentialStore>) -> Self {
        Self {
            realm: realm.into(),
            nonce_validity,
            allow_basic: false,
            credentials,
            nonces: Mutex::new(HashMap::new()),
        }
    }

    /// Also accept `Authorization: Basic`, checked against the salted hash.
    pub fn with_basic(mut self, allow: bool) -> Self {
        self.allow_basic = allow;
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Builds a `WWW-Authenticate` value with a freshly issued nonce.
    pub fn challenge(&self) -> Result<String> {
        let nonce = self.issue_nonce()?;
        Ok(format!(
            "Digest realm=\"{}\", qop=\"auth\", algorithm=MD5, nonce=\"{}\"",
            self.realm, nonce
        ))
    }

    /// Number of nonces currently remembered.
    pub fn outstanding_nonces(&self) -> usize {
        self.nonces.lock().len()
    }

    fn issue_nonce(&self) -> Result<String> {
        let mut raw = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut raw)
            .map_err(|_| Error::Internal("random source unavailable".to_string()))?;
        let nonce = hex::encode(raw);

        let now = Instant::now();
        let mut nonces = self.nonces.lock();
        nonces.retain(|_, e| now.duration_since(e.issued) < self.nonce_validity);
        if nonces.len() >= MAX_OUTSTANDING_NONCES {
            let oldest = nonces
                .iter()
                .min_by_key(|(_, e)| e.issued)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                nonces.remove(&oldest);
            }
        }
        nonces.insert(
            nonce.clone(),
            NonceEntry {
                issued: now,
                last_nc: 0,
            },
        );
        Ok(nonce)
    }

    /// Verifies the request's `Authorization` header and returns the
    /// authenticated username.
    ///
    /// The error kind is for logging only; callers answer every failure with
    /// the same 401 challenge.
    pub fn authenticate(&self, request: &Request) -> Result<String> {
        let header = request
            .headers
            .get("Authorization")
            .ok_or(Error::AuthenticationFailed)?;
        if header.len() > MAX_AUTH_HEADER_LEN {
            return Err(Error::ParseFailure("authorization header too long".to_string()));
        }

        let (scheme, rest) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
        if scheme.eq_ignore_ascii_case("Digest") {
            self.verify_digest(request, rest)
        } else if scheme.eq_ignore_ascii_case("Basic") && self.allow_basic {
            self.verify_basic(rest)
        } else {
            Err(Error::AuthenticationFailed)
        }
    }

    fn verify_digest(&self, request: &Request, raw: &str) -> Result<String> {
        let params = DigestParams::parse(raw)?;

        let username = params.require("username")?;
        let realm = params.require("realm")?;
        let nonce = params.require("nonce")?;
        let uri = params.require("uri")?;
        let response = params.require("response")?;
        let algorithm = match params.get("algorithm") {
            Some(a) => DigestAlgorithm::parse(a)
                .ok_or_else(|| Error::Unsupported("digest algorithm".to_string()))?,
            None => DigestAlgorithm::Md5,
        };

        if realm != self.realm {
            return Err(Error::AuthenticationFailed);
        }
        if uri != request.target.as_str() {
            return Err(Error::AuthenticationFailed);
        }

        // qop=auth carries nc/cnonce; the legacy form carries neither
        let qop = params.get("qop");
        let counter = match qop {
            Some(q) if q.eq_ignore_ascii_case("auth") => {
                let nc = params.require("nc")?;
                let cnonce = params.require("cnonce")?;
                if nc.len() != 8 {
                    return Err(Error::ParseFailure("nonce count must be 8 hex digits".to_string()));
                }
                let count = u32::from_str_radix(nc, 16)
                    .map_err(|_| Error::ParseFailure("nonce count is not hex".to_string()))?;
                Some((nc, cnonce, count))
            }
            Some(_) => return Err(Error::Unsupported("digest qop".to_string())),
            None => None,
        };

        let credential = self
            .credentials
            .lookup_active(username)
            .ok_or(Error::AuthenticationFailed)?;

        let ha1 = algorithm.hash(&format!(
            "{}:{}:{}",
            username, self.realm, credential.password_hash
        ));
        let ha2 = algorithm.hash(&format!("{}:{}", request.method.as_str(), uri));
        let expected = match counter {
            Some((nc, cnonce, _)) => {
                algorithm.hash(&format!("{}:{}:{}:{}:auth:{}", ha1, nonce, nc, cnonce, ha2))
            }
            None => algorithm.hash(&format!("{}:{}:{}", ha1, nonce, ha2)),
        };

        if !constant_time_eq(expected.as_bytes(), response.to_ascii_lowercase().as_bytes()) {
            return Err(Error::AuthenticationFailed);
        }

        // The nonce is only consumed once the response is known to be good.
        let mut nonces = self.nonces.lock();
        let expired = match nonces.get(nonce) {
            Some(entry) => entry.issued.elapsed() >= self.nonce_validity,
            None => return Err(Error::AuthenticationFailed),
        };
        if expired {
            nonces.remove(nonce);
            return Err(Error::AuthenticationFailed);
        }
        if let Some((_, _, count)) = counter {
            let entry = nonces.get_mut(nonce).ok_or(Error::AuthenticationFailed)?;
            if count <= entry.last_nc {
                tracing::warn!(username, "Digest nonce count replayed");
                return Err(Error::AuthenticationFailed);
            }
            entry.last_nc = count;
        }

        Ok(username.to_string())
    }

    fn verify_basic(&self, raw: &str) -> Result<String> {
        let decoded = BASE64
            .decode(raw.trim())
            .map_err(|_| Error::ParseFailure("basic credentials are not base64".to_string()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| Error::ParseFailure("basic credentials are not UTF-8".to_string()))?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| Error::ParseFailure("basic credentials lack ':'".to_string()))?;

        let credential = self
            .credentials
            .lookup_active(username)
            .ok_or(Error::AuthenticationFailed)?;
        verify_password(password, &credential.password_hash)?;
        Ok(username.to_string())
    }
}
