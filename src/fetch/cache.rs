//! Content-addressed disk cache for raw response bodies.
//!
//! One file per entry, named by the request fingerprint, holding the raw
//! body bytes. Entries are write-once and never revalidated against the
//! origin; deleting the cache directory wholesale is the supported way to
//! force a re-fetch.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use super::FetchError;

/// File extension for cache entries.
const CACHE_SUFFIX: &str = "cache";

/// Disk cache owned by one [`FetchClient`](super::FetchClient).
#[derive(Debug)]
pub struct HttpCache {
    dir: PathBuf,
}

impl HttpCache {
    /// Opens the cache, creating the directory if needed (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Cache`] if the directory cannot be created.
    #[instrument(fields(dir = %dir.display()))]
    pub fn open(dir: &Path) -> Result<Self, FetchError> {
        fs::create_dir_all(dir).map_err(|source| FetchError::cache(dir, source))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Returns the raw bytes stored under `key`, or None on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Cache`] if the entry exists but cannot be read.
    pub fn load(&self, key: &str) -> Result<Option<Vec<u8>>, FetchError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|source| FetchError::cache(&path, source))?;
        debug!(key, bytes = bytes.len(), "cache hit");
        Ok(Some(bytes))
    }

    /// Stores `bytes` under `key`, overwriting any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Cache`] if the entry cannot be written. Cache
    /// write failures are not masked: a cache that silently stops filling
    /// would re-fetch everything on the next run.
    pub fn store(&self, key: &str, bytes: &[u8]) -> Result<(), FetchError> {
        let path = self.entry_path(key);
        fs::write(&path, bytes).map_err(|source| FetchError::cache(&path, source))?;
        debug!(key, bytes = bytes.len(), "cached response body");
        Ok(())
    }

    /// Removes the entry stored under `key`, if any.
    ///
    /// Callers use this to force a re-fetch of a single request (e.g. a
    /// stalled step response that must not be replayed from disk).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Cache`] if the entry exists but cannot be removed.
    pub fn invalidate(&self, key: &str) -> Result<(), FetchError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key, "invalidated cache entry");
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FetchError::cache(&path, source)),
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{CACHE_SUFFIX}"))
    }
}

/// Derives the cache fingerprint for a request.
///
/// SHA-256 over the URL plus canonically ordered serializations of the
/// query and form pairs. Pairs are sorted by key then value (duplicate
/// keys preserved), so the fingerprint is sensitive to request content
/// but insensitive to parameter ordering.
#[must_use]
pub fn fingerprint(url: &str, query: &[(String, String)], form: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    if !query.is_empty() {
        hasher.update(canonical_pairs(query).as_bytes());
    }
    if !form.is_empty() {
        hasher.update(canonical_pairs(form).as_bytes());
    }
    hex_digest(&hasher.finalize())
}

/// Serializes pairs in sorted order as `k=v&k=v`, percent-encoded.
fn canonical_pairs(pairs: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
    sorted.sort();
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in sorted {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn hex_digest(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
