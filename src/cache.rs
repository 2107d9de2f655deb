use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use sha2::{Digest as _, Sha256};

use crate::rules::TitleRules;
use crate::segment::{self, Chapter};

/// SHA-256 over input bytes and the configuration that shaped a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Fingerprint of a text source segmented under `rules`.
    pub fn of_text(bytes: &[u8], rules: &TitleRules) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
        rules.digest_into(&mut hasher);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Memoizes one value per fingerprint.
///
/// Concurrent callers asking for the same fingerprint block on a single computation.
#[derive(Debug)]
pub struct Memo<T> {
    slots: Mutex<HashMap<Fingerprint, Arc<OnceLock<Arc<T>>>>>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Memo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&self, key: Fingerprint, compute: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key).or_default())
        };
        Arc::clone(slot.get_or_init(|| {
            tracing::debug!(fingerprint = %key, "cache miss");
            Arc::new(compute())
        }))
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`segment::segment`] memoized by the fingerprint of the raw input and rules.
pub fn segment_cached<S: AsRef<str>>(
    cache: &Memo<Vec<Chapter>>,
    raw: &[u8],
    lines: &[S],
    rules: &TitleRules,
) -> Arc<Vec<Chapter>> {
    cache.get_or_compute(Fingerprint::of_text(raw, rules), || {
        segment::segment(lines, rules)
    })
}
