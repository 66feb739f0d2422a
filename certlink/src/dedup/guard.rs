//! Time-windowed duplicate suppression.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Remembers processed fingerprints for a retention window.
///
/// Entries older than the window are dropped when looked up; the rest are
/// removed by [`purge_expired`](Self::purge_expired), either on demand or
/// from the background sweeper.
pub struct DedupGuard {
    processed: DashMap<String, DateTime<Utc>>,
    retention: chrono::Duration,
}

impl DedupGuard {
    pub fn new(retention: Duration) -> Self {
        Self {
            processed: DashMap::new(),
            retention: chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX),
        }
    }

    #[inline]
    fn is_live(&self, processed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - processed_at < self.retention
    }

    pub fn is_duplicate(&self, fingerprint: &str) -> bool {
        self.is_duplicate_at(fingerprint, Utc::now())
    }

    pub fn is_duplicate_at(&self, fingerprint: &str, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.processed.get(fingerprint) else {
            return false;
        };

        if self.is_live(*entry, now) {
            return true;
        }

        drop(entry); // Release the shard lock before removing
        self.processed
            .remove_if(fingerprint, |_, at| !self.is_live(*at, now));
        false
    }

    /// Record `fingerprint` as processed now. Marking again refreshes the time.
    pub fn mark_processed(&self, fingerprint: &str) {
        self.mark_processed_at(fingerprint, Utc::now());
    }

    pub fn mark_processed_at(&self, fingerprint: &str, now: DateTime<Utc>) {
        self.processed.insert(fingerprint.to_string(), now);
    }

    /// Atomically check and mark `fingerprint`.
    ///
    /// Returns `true` if the caller is the first within the window and should
    /// process the event, `false` if it is a duplicate.
    pub fn try_admit(&self, fingerprint: &str) -> bool {
        self.try_admit_at(fingerprint, Utc::now())
    }

    pub fn try_admit_at(&self, fingerprint: &str, now: DateTime<Utc>) -> bool {
        match self.processed.entry(fingerprint.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.is_live(*entry.get(), now) {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Remove entries older than the retention window. Returns how many
    /// were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.processed.len();
        self.processed.retain(|_, at| self.is_live(*at, now));
        before.saturating_sub(self.processed.len())
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Spawn a task that purges expired entries every `interval` until
    /// `cancel` fires.
    pub fn start_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let guard = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Dedup sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = guard.purge_expired();
                        if removed > 0 {
                            info!(
                                removed,
                                remaining = guard.len(),
                                "Purged expired event fingerprints"
                            );
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> DedupGuard {
        DedupGuard::new(Duration::from_secs(24 * 3600))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_mark_then_duplicate() {
        let guard = guard();
        assert!(!guard.is_duplicate_at("nowcerts_abc", t0()));

        guard.mark_processed_at("nowcerts_abc", t0());

        assert!(guard.is_duplicate_at("nowcerts_abc", t0() + chrono::Duration::hours(1)));
        assert!(!guard.is_duplicate_at("nowcerts_other", t0()));
    }

    #[test]
    fn test_entry_expires_after_window() {
        let guard = guard();
        guard.mark_processed_at("ghl_abc", t0());

        assert!(guard.is_duplicate_at("ghl_abc", t0() + chrono::Duration::hours(23)));
        assert!(!guard.is_duplicate_at("ghl_abc", t0() + chrono::Duration::hours(25)));
        assert!(guard.is_empty());
    }

    #[test]
    fn test_try_admit_is_first_wins() {
        let guard = guard();
        assert!(guard.try_admit_at("ghl_x", t0()));
        assert!(!guard.try_admit_at("ghl_x", t0() + chrono::Duration::minutes(5)));
        // After the window the event is admitted again.
        assert!(guard.try_admit_at("ghl_x", t0() + chrono::Duration::hours(30)));
    }

    #[test]
    fn test_purge_expired() {
        let guard = guard();
        guard.mark_processed_at("old", t0());
        guard.mark_processed_at("new", t0() + chrono::Duration::hours(20));

        let removed = guard.purge_expired_at(t0() + chrono::Duration::hours(26));

        assert_eq!(removed, 1);
        assert_eq!(guard.len(), 1);
        assert!(guard.is_duplicate_at("new", t0() + chrono::Duration::hours(26)));
    }

    #[test]
    fn test_concurrent_admission_single_winner() {
        let guard = Arc::new(guard());
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let guard = Arc::clone(&guard);
                    s.spawn(move || guard.try_admit("nowcerts_same") as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let guard = Arc::new(guard());
        let cancel = CancellationToken::new();
        let handle = guard.start_sweeper(Duration::from_secs(3600), cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
