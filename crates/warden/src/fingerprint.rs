//! One-way digests of a candidate secret.
//!
//! Two digests are derived and the raw value is never stored next to either:
//! - [`Fingerprint`]: HMAC-SHA256 under a per-process random key. Keys the
//!   result cache and identifies candidates in logs. Not comparable across
//!   restarts, and useless for offline guessing without the key.
//! - [`RangeQuery`]: SHA-1 split into the 5-char prefix sent to the range API and
//!   the suffix matched locally (k-anonymity)

use std::fmt;
use std::sync::OnceLock;

use hmac::digest::Key;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use warden_common::constants::RANGE_PREFIX_LEN;

type HmacSha256 = Hmac<Sha256>;

static PROCESS_KEY: OnceLock<Key<HmacSha256>> = OnceLock::new();

fn process_key() -> &'static Key<HmacSha256> {
    PROCESS_KEY.get_or_init(|| {
        let mut key = Key::<HmacSha256>::default();
        rand::rng().fill(key.as_mut_slice());
        key
    })
}

/// Keyed fingerprint of a candidate value, stable for the life of the process
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(candidate: &str) -> Self {
        let mut mac = <HmacSha256 as Mac>::new(process_key());
        mac.update(candidate.as_bytes());
        Self(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex chars, safe for log lines
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

// Debug prints only the short form so a fingerprint never floods logs.
impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}..)", self.short())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// k-anonymity range lookup: uppercase SHA-1 hex split at the prefix length
#[derive(Clone, PartialEq, Eq)]
pub struct RangeQuery {
    prefix: String,
    suffix: String,
}

impl RangeQuery {
    pub fn of(candidate: &str) -> Self {
        let digest = hex::encode_upper(Sha1::digest(candidate.as_bytes()));
        let (prefix, suffix) = digest.split_at(RANGE_PREFIX_LEN);
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }
    }

    /// The only part of the digest that leaves the process
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Debug for RangeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeQuery").field("prefix", &self.prefix).finish_non_exhaustive()
    }
}
