//! mbk-cache
//!
//! Device-local persistent entitlement cache: one JSON record on disk,
//! keyed by file path, surviving process and web-view restarts.
//!
//! # Invariants
//!
//! - A record is **trusted** only when it belongs to the current user and
//!   is younger than the max cache age.
//! - A same-user but stale-aged record is **not deleted** — it is returned
//!   as a diagnostic hint and remains a last-resort fallback on disk.
//! - Deletion happens only through [`EntitlementCache::clear`], which
//!   callers invoke on sign-out, on a restore that confirmed no
//!   entitlement, or on an identity mismatch. An inconclusive read never
//!   deletes anything.
//! - Corrupt or unreadable records classify as [`CacheLookup::Missing`]
//!   (logged); they never surface as errors to gating code.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use mbk_schemas::CachedEntitlement;

/// Default trust window for a cached record, in hours. Multi-hour by
/// design: long enough to ride out a day of transient bridge failures,
/// short enough that a genuine cancellation is not masked past one day.
pub const DEFAULT_MAX_CACHE_AGE_HOURS: i64 = 24;

/// [`DEFAULT_MAX_CACHE_AGE_HOURS`] as a `Duration`.
pub fn default_max_cache_age() -> Duration {
    Duration::hours(DEFAULT_MAX_CACHE_AGE_HOURS)
}

// ---------------------------------------------------------------------------
// CacheLookup
// ---------------------------------------------------------------------------

/// Result of validating the on-disk record against the current user and
/// the max cache age.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Same user, within the trust window. Usable for state decisions.
    Fresh(CachedEntitlement),
    /// Same user, but older than the trust window. Diagnostic hint only —
    /// never feed this into a state decision.
    StaleAged(CachedEntitlement),
    /// Record belongs to a different user than the one asked about.
    UserMismatch,
    /// No record, or a record that could not be read or parsed.
    Missing,
}

impl CacheLookup {
    /// The record, if it is trusted for state decisions.
    pub fn fresh(self) -> Option<CachedEntitlement> {
        match self {
            CacheLookup::Fresh(rec) => Some(rec),
            _ => None,
        }
    }

    /// The record regardless of age (fresh or stale), for logging.
    pub fn hint(&self) -> Option<&CachedEntitlement> {
        match self {
            CacheLookup::Fresh(rec) | CacheLookup::StaleAged(rec) => Some(rec),
            _ => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheLookup::Fresh(_))
    }
}

// ---------------------------------------------------------------------------
// EntitlementCache
// ---------------------------------------------------------------------------

/// Handle to the single on-disk cache record.
#[derive(Debug, Clone)]
pub struct EntitlementCache {
    path: PathBuf,
}

impl EntitlementCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a record, overwriting any previous one.
    ///
    /// The write is atomic (temp file + rename) so a crash mid-write can
    /// never leave a truncated record behind.
    pub fn save(&self, record: &CachedEntitlement) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create cache dir failed: {}", parent.display()))?;
        }

        let json = serde_json::to_string(record).context("serialize cache record failed")?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, format!("{json}\n"))
            .with_context(|| format!("write cache temp file failed: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename cache file failed: {}", self.path.display()))?;

        tracing::debug!(
            user_id = %record.user_id,
            is_pro = record.is_pro,
            "entitlement cache written"
        );
        Ok(())
    }

    /// Load and classify the record for `user_id` at `now`.
    ///
    /// IO and parse failures are absorbed here: gating code upstream must
    /// always receive a classification, never an error.
    pub fn load(&self, user_id: &str, now: DateTime<Utc>, max_age: Duration) -> CacheLookup {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return CacheLookup::Missing;
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "cache read failed");
                return CacheLookup::Missing;
            }
        };

        let record: CachedEntitlement = match serde_json::from_str(&raw) {
            Ok(rec) => rec,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "cache record corrupt");
                return CacheLookup::Missing;
            }
        };

        if record.user_id != user_id {
            tracing::warn!(
                cached_user = %record.user_id,
                "cache record belongs to a different user"
            );
            return CacheLookup::UserMismatch;
        }

        if record.age_ms(now) > max_age.num_milliseconds() {
            return CacheLookup::StaleAged(record);
        }

        CacheLookup::Fresh(record)
    }

    /// Remove the record. Missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "entitlement cache cleared");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("remove cache file failed: {}", self.path.display())),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
