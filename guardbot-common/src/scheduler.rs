use std::future::Future;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use teloxide::prelude::ChatId;
use tokio::sync::watch;

/// Key of a named periodic job. There is at most one running job per key:
/// one global verification loop, and one broadcast loop per chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKey {
    ProofVerification,
    RaidBroadcast(ChatId),
    PhraseBroadcast(ChatId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

pub struct JobScheduler {
    jobs: DashMap<JobKey, watch::Sender<bool>>,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Registers a repeating job under `key`, firing `first_delay` after
    /// registration and every `interval` after that. A key that is already
    /// registered is left untouched.
    pub fn start<F, Fut>(
        &self,
        key: JobKey,
        first_delay: Duration,
        interval: Duration,
        mut job: F,
    ) -> StartOutcome
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let entry = match self.jobs.entry(key) {
            Entry::Occupied(_) => return StartOutcome::AlreadyRunning,
            Entry::Vacant(vacant) => vacant,
        };

        let (cancel, mut cancelled) = watch::channel(false);
        tokio::spawn(async move {
            let mut delay = first_delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancelled.changed() => break,
                }
                // A stop issued while the job body runs takes effect here,
                // never by interrupting the invocation.
                job().await;
                if *cancelled.borrow() {
                    break;
                }
                delay = interval;
            }
        });
        entry.insert(cancel);

        StartOutcome::Started
    }

    /// Cancels the job registered under `key` and returns whether one was
    /// running. An invocation that is already in flight runs to completion;
    /// stopping an unknown key does nothing.
    pub fn stop(&self, key: &JobKey) -> bool {
        if let Some((_, cancel)) = self.jobs.remove(key) {
            let _ = cancel.send(true);
            true
        } else {
            false
        }
    }

    pub fn is_running(&self, key: &JobKey) -> bool {
        self.jobs.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counting_job(count: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<()> + Send {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::Relaxed);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn job_fires_on_schedule() {
        let scheduler = JobScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        let outcome = scheduler.start(
            JobKey::ProofVerification,
            Duration::from_secs(10),
            Duration::from_secs(900),
            counting_job(&count),
        );
        assert_eq!(outcome, StartOutcome::Started);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(count.load(Ordering::Relaxed), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::Relaxed), 1);

        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_refuses_to_double_register() {
        let scheduler = JobScheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        assert_eq!(
            scheduler.start(
                JobKey::ProofVerification,
                Duration::from_secs(10),
                Duration::from_secs(10),
                counting_job(&first),
            ),
            StartOutcome::Started,
        );
        assert_eq!(
            scheduler.start(
                JobKey::ProofVerification,
                Duration::from_secs(1),
                Duration::from_secs(1),
                counting_job(&second),
            ),
            StartOutcome::AlreadyRunning,
        );

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(first.load(Ordering::Relaxed), 3);
        assert_eq!(second.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_future_invocations() {
        let scheduler = JobScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        scheduler.start(
            JobKey::RaidBroadcast(ChatId(-100)),
            Duration::from_secs(10),
            Duration::from_secs(10),
            counting_job(&count),
        );
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(count.load(Ordering::Relaxed), 1);

        assert!(scheduler.stop(&JobKey::RaidBroadcast(ChatId(-100))));
        assert!(!scheduler.is_running(&JobKey::RaidBroadcast(ChatId(-100))));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn stopping_unknown_key_is_a_noop() {
        let scheduler = JobScheduler::new();
        assert!(!scheduler.stop(&JobKey::PhraseBroadcast(ChatId(-1))));
    }

    #[tokio::test(start_paused = true)]
    async fn per_chat_keys_are_independent() {
        let scheduler = JobScheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler.start(
            JobKey::PhraseBroadcast(ChatId(-1)),
            Duration::from_secs(10),
            Duration::from_secs(10),
            counting_job(&first),
        );
        scheduler.start(
            JobKey::PhraseBroadcast(ChatId(-2)),
            Duration::from_secs(10),
            Duration::from_secs(10),
            counting_job(&second),
        );

        assert!(scheduler.stop(&JobKey::PhraseBroadcast(ChatId(-1))));
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(first.load(Ordering::Relaxed), 0);
        assert_eq!(second.load(Ordering::Relaxed), 1);
    }
}
