//! Periodic removal of expired files.

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::Clock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::repo::{FileRepo, RepoError};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Files deleted.
    pub deleted: usize,
    /// Time the sweep took.
    pub elapsed: Duration,
}

/// Deletes files whose expiration has been reached.
#[derive(Clone)]
pub struct ExpirySweeper {
    files: Arc<FileRepo>,
    clock: Arc<dyn Clock>,
}

impl ExpirySweeper {
    /// Creates a sweeper over `files`.
    pub fn new(files: Arc<FileRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { files, clock }
    }

    /// Runs one sweep.
    pub fn run_once(&self) -> Result<SweepReport, RepoError> {
        let start = Instant::now();
        let deleted = self.files.delete_expired_before(self.clock.now())?;
        let report = SweepReport {
            deleted,
            elapsed: start.elapsed(),
        };

        if deleted == 0 {
            tracing::debug!("Expiry sweep deleted no files in {:?}", report.elapsed);
        } else {
            tracing::info!(
                "Expiry sweep deleted {} expired file(s) in {:?}",
                deleted,
                report.elapsed
            );
        }
        Ok(report)
    }

    /// Sweeps every `interval` until `cancel` fires.
    ///
    /// The first sweep runs immediately. A failed sweep is logged and the
    /// loop carries on.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Expiry sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let sweeper = self.clone();
                        match tokio::task::spawn_blocking(move || sweeper.run_once()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => tracing::error!("Expiry sweep failed: {}", e),
                            Err(e) => tracing::error!("Expiry sweep task panicked: {}", e),
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
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use domain::{File, FileHeader, FixedClock};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn expiring(id: &str, expires: DateTime<Utc>) -> File {
        File::new(
            FileHeader {
                id: id.into(),
                name: id.to_string(),
                owner: "user1".into(),
                created: t(0),
                expires: Some(expires),
                ..Default::default()
            },
            Box::new(Cursor::new(Vec::new())),
        )
    }

    fn setup(temp_dir: &TempDir, clock: Arc<FixedClock>) -> (Arc<FileRepo>, ExpirySweeper) {
        let files = Arc::new(FileRepo::open(temp_dir.path(), &CancellationToken::new()).unwrap());
        let sweeper = ExpirySweeper::new(Arc::clone(&files), clock);
        (files, sweeper)
    }

    #[test]
    fn test_run_once_deletes_expired() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::new(t(100)));
        let (files, sweeper) = setup(&temp_dir, Arc::clone(&clock));

        files.save(expiring("soon", t(100))).unwrap();
        files.save(expiring("later", t(200))).unwrap();

        assert_eq!(sweeper.run_once().unwrap().deleted, 1);
        assert_eq!(sweeper.run_once().unwrap().deleted, 0);

        clock.advance(TimeDelta::seconds(100));
        assert_eq!(sweeper.run_once().unwrap().deleted, 1);
        assert!(files.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_spawn_sweeps_until_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::new(t(1_000)));
        let (files, sweeper) = setup(&temp_dir, clock);
        files.save(expiring("old", t(500))).unwrap();

        let cancel = CancellationToken::new();
        let handle = sweeper.spawn(Duration::from_millis(10), cancel.clone());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !files.is_empty().unwrap() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(files.is_empty().unwrap());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
