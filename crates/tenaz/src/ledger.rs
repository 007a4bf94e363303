//! Shared resource ledger.
//!
//! Flows that consume one-shot identifiers (funded wallet addresses,
//! invite codes) share a JSON ledger of already-used entries: an array of
//! lowercase strings, read at flow start and appended at completion. The
//! ledger file is shared across parallel test workers, so every
//! read-modify-write happens under an exclusive lock file; an ad-hoc
//! rewrite of the JSON would double-allocate under concurrency.
//!
//! The format stays an opaque "mark used / get unused" service to
//! callers; nothing else about the identifiers is interpreted.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::result::{TenazError, TenazResult};

/// Default number of lock acquisition attempts
pub const DEFAULT_LOCK_RETRIES: u32 = 50;

/// Default delay between lock acquisition attempts (100ms)
pub const DEFAULT_LOCK_RETRY_DELAY_MS: u64 = 100;

/// A lock-file-guarded ledger of consumed identifiers
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    path: PathBuf,
    lock_retries: u32,
    lock_retry_delay: Duration,
}

/// Held while a ledger operation is in progress; releases on drop
#[derive(Debug)]
struct LedgerLock {
    path: PathBuf,
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl ResourceLedger {
    /// Open a ledger at the given path. The file need not exist yet; a
    /// missing ledger reads as empty.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_retries: DEFAULT_LOCK_RETRIES,
            lock_retry_delay: Duration::from_millis(DEFAULT_LOCK_RETRY_DELAY_MS),
        }
    }

    /// Tune lock acquisition retry behavior
    #[must_use]
    pub const fn with_lock_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.lock_retries = retries;
        self.lock_retry_delay = delay;
        self
    }

    /// The ledger file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| "ledger".to_string(), |n| n.to_string_lossy().to_string());
        name.push_str(".lock");
        self.path.with_file_name(name)
    }

    /// Acquire the exclusive lock file, retrying while another worker
    /// holds it.
    fn acquire(&self) -> TenazResult<LedgerLock> {
        let lock_path = self.lock_path();
        for _ in 0..self.lock_retries.max(1) {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(LedgerLock { path: lock_path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    std::thread::sleep(self.lock_retry_delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(TenazError::Timeout {
            condition: format!("ledger lock at {}", lock_path.display()),
            waited_ms: u64::from(self.lock_retries) * self.lock_retry_delay.as_millis() as u64,
            last_observed: "lock file still held by another worker".to_string(),
        })
    }

    fn read_entries(&self) -> TenazResult<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        let entries: Vec<String> = serde_json::from_str(&json)?;
        Ok(entries.into_iter().map(|e| e.to_lowercase()).collect())
    }

    fn write_entries(&self, entries: &[String]) -> TenazResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Whether an identifier has already been consumed
    pub fn is_used(&self, id: &str) -> TenazResult<bool> {
        let _lock = self.acquire()?;
        Ok(self.read_entries()?.contains(&id.to_lowercase()))
    }

    /// Record an identifier as consumed. Idempotent.
    pub fn mark_used(&self, id: &str) -> TenazResult<()> {
        let _lock = self.acquire()?;
        let mut entries = self.read_entries()?;
        let id = id.to_lowercase();
        if !entries.contains(&id) {
            entries.push(id);
            self.write_entries(&entries)?;
        }
        Ok(())
    }

    /// The first candidate not yet consumed, without claiming it
    pub fn next_unused(&self, candidates: &[String]) -> TenazResult<Option<String>> {
        let _lock = self.acquire()?;
        let entries = self.read_entries()?;
        Ok(candidates
            .iter()
            .map(|c| c.to_lowercase())
            .find(|c| !entries.contains(c)))
    }

    /// Atomically pick the first unconsumed candidate AND record it as
    /// consumed, under one lock hold.
    ///
    /// This is the call parallel workers must use: a separate
    /// `next_unused` + `mark_used` pair reopens the race the lock exists
    /// to close.
    pub fn claim_next_unused(&self, candidates: &[String]) -> TenazResult<Option<String>> {
        let _lock = self.acquire()?;
        let mut entries = self.read_entries()?;
        let claimed = candidates
            .iter()
            .map(|c| c.to_lowercase())
            .find(|c| !entries.contains(c));
        if let Some(id) = &claimed {
            entries.push(id.clone());
            self.write_entries(&entries)?;
            tracing::debug!(id = %id, "ledger entry claimed");
        }
        Ok(claimed)
    }

    /// Number of consumed identifiers
    pub fn used_count(&self) -> TenazResult<usize> {
        let _lock = self.acquire()?;
        Ok(self.read_entries()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_in(dir: &TempDir) -> ResourceLedger {
        ResourceLedger::new(dir.path().join("used_wallets.json"))
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        assert_eq!(ledger.used_count().unwrap(), 0);
        assert!(!ledger.is_used("0xabc").unwrap());
    }

    #[test]
    fn test_mark_used_is_idempotent_and_lowercases() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);

        ledger.mark_used("0xABCDEF").unwrap();
        ledger.mark_used("0xabcdef").unwrap();

        assert_eq!(ledger.used_count().unwrap(), 1);
        assert!(ledger.is_used("0xAbCdEf").unwrap());

        // On-disk format stays an array of lowercase strings.
        let raw = std::fs::read_to_string(ledger.path()).unwrap();
        let entries: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(entries, vec!["0xabcdef".to_string()]);
    }

    #[test]
    fn test_claim_next_unused_skips_consumed() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let candidates = vec![
            "0xAAA".to_string(),
            "0xBBB".to_string(),
            "0xCCC".to_string(),
        ];

        assert_eq!(
            ledger.claim_next_unused(&candidates).unwrap().as_deref(),
            Some("0xaaa")
        );
        assert_eq!(
            ledger.claim_next_unused(&candidates).unwrap().as_deref(),
            Some("0xbbb")
        );
        assert_eq!(
            ledger.claim_next_unused(&candidates).unwrap().as_deref(),
            Some("0xccc")
        );
        assert_eq!(ledger.claim_next_unused(&candidates).unwrap(), None);
    }

    #[test]
    fn test_next_unused_does_not_claim() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let candidates = vec!["0xaaa".to_string()];

        assert!(ledger.next_unused(&candidates).unwrap().is_some());
        assert!(ledger.next_unused(&candidates).unwrap().is_some());
        assert_eq!(ledger.used_count().unwrap(), 0);
    }

    #[test]
    fn test_lock_contention_times_out() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir).with_lock_retry(3, Duration::from_millis(10));

        // Simulate another worker holding the lock.
        std::fs::write(ledger.lock_path(), b"").unwrap();

        let err = ledger.mark_used("0xabc").unwrap_err();
        assert!(matches!(err, TenazError::Timeout { .. }));

        std::fs::remove_file(ledger.lock_path()).unwrap();
        ledger.mark_used("0xabc").unwrap();
    }

    #[test]
    fn test_parallel_claims_never_duplicate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("used_wallets.json");
        let candidates: Vec<String> = (0..8).map(|i| format!("0xwallet{i}")).collect();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let path = path.clone();
            let candidates = candidates.clone();
            handles.push(std::thread::spawn(move || {
                ResourceLedger::new(path).claim_next_unused(&candidates).unwrap()
            }));
        }

        let mut claimed: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().expect("a candidate available"))
            .collect();
        claimed.sort();
        claimed.dedup();
        assert_eq!(claimed.len(), 8, "a wallet was double-allocated");
    }
}
