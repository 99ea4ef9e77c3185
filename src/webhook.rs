//! Push-notification adapter for GitHub webhooks.
//!
//! GitHub signs each delivery with `X-Hub-Signature-256: sha256=<hex>`, an
//! HMAC-SHA256 of the raw body under the shared secret. Deliveries are only
//! trusted after [`verify_signature`] succeeds; comparison is constant time
//! via [`Mac::verify_slice`].

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("webhook secret is not configured")]
    NoSecret,
    #[error("missing signature header")]
    Missing,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
}

/// Checks `header` against the HMAC of `body` under `secret`.
pub fn verify_signature(
    secret: Option<&str>,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::NoSecret)?;
    let header = header.ok_or(SignatureError::Missing)?;
    let hex_sig = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::Malformed)?;
    let expected = hex::decode(hex_sig).map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// `sha256=<hex>` signature for `body`, as GitHub would send it.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// The subset of a `push` payload needed to decide whether to sync.
#[derive(Debug, Default, Deserialize)]
pub struct PushEvent {
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PushCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub added: Option<Vec<String>>,
    #[serde(default)]
    pub modified: Option<Vec<String>>,
    #[serde(default)]
    pub removed: Option<Vec<String>>,
}

impl PushCommit {
    fn has_file_lists(&self) -> bool {
        self.added.is_some() || self.modified.is_some() || self.removed.is_some()
    }

    fn paths(&self) -> impl Iterator<Item = &String> {
        [&self.added, &self.modified, &self.removed]
            .into_iter()
            .flatten()
            .flatten()
    }
}

impl PushEvent {
    /// True when any pushed commit touches `prefix`. Pushes that carry no
    /// per-file lists (e.g. very large pushes) are assumed relevant.
    pub fn touches_prefix(&self, prefix: &str) -> bool {
        if self.commits.is_empty() || self.commits.iter().any(|c| !c.has_file_lists()) {
            return true;
        }
        self.commits
            .iter()
            .flat_map(PushCommit::paths)
            .any(|p| p.starts_with(prefix))
    }
}
