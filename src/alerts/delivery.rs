//! Alert delivery queue
//!
//! Jobs go into a bounded channel drained by one worker thread. Each job is offered to every
//! channel; transient failures are retried with doubling backoff, permanent failures and
//! exhausted retries become dead letters.

use super::channels::AlertChannel;
use super::Notification;
use crate::config::DeliverySettings;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("channel not configured: {0}")]
    NotConfigured(String),
    #[error("transient delivery failure: {0}")]
    Transient(String),
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }
}

/// One notification addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub notification: Notification,
    pub recipient: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeliverySettings::default())
    }
}

impl From<&DeliverySettings> for RetryPolicy {
    fn from(settings: &DeliverySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_backoff: Duration::from_millis(settings.base_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1u32 << exp)
    }
}

/// Try one channel until it succeeds, fails permanently or runs out of attempts.
/// Returns the number of attempts used on success.
pub fn deliver_with_retry(
    channel: &mut dyn AlertChannel,
    job: &DeliveryJob,
    policy: &RetryPolicy,
    sleep: &dyn Fn(Duration),
) -> Result<u32, (DeliveryError, u32)> {
    let mut attempt = 1;
    loop {
        match channel.send(job) {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let wait = policy.backoff_for(attempt);
                warn!(
                    "Delivery: {} attempt {}/{} for {} failed, retrying in {:?}: {}",
                    channel.name(),
                    attempt,
                    policy.max_attempts,
                    job.notification.id,
                    wait,
                    e
                );
                sleep(wait);
                attempt += 1;
            }
            Err(e) => return Err((e, attempt)),
        }
    }
}

/// A job that could not be delivered on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job: DeliveryJob,
    pub channel: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

pub struct DeliveryQueue {
    sender: Option<SyncSender<DeliveryJob>>,
    worker: Option<JoinHandle<()>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    delivered: Arc<AtomicUsize>,
}

impl DeliveryQueue {
    /// Spawn the worker thread.
    pub fn start(channels: Vec<Box<dyn AlertChannel>>, policy: RetryPolicy, capacity: usize) -> Self {
        Self::start_with_sleep(channels, policy, capacity, std::thread::sleep)
    }

    pub fn start_with_sleep(
        mut channels: Vec<Box<dyn AlertChannel>>,
        policy: RetryPolicy,
        capacity: usize,
        sleep: fn(Duration),
    ) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<DeliveryJob>(capacity.max(1));
        let dead_letters = Arc::new(Mutex::new(Vec::new()));
        let delivered = Arc::new(AtomicUsize::new(0));
        let dead_for_worker = dead_letters.clone();
        let delivered_for_worker = delivered.clone();

        info!(
            "Delivery: starting worker ({} channels, max {} attempts)",
            channels.len(),
            policy.max_attempts
        );
        let worker = std::thread::spawn(move || {
            for job in receiver {
                for channel in channels.iter_mut() {
                    match deliver_with_retry(channel.as_mut(), &job, &policy, &sleep) {
                        Ok(attempts) => {
                            debug!(
                                "Delivery: {} sent {} to {} after {} attempt(s)",
                                channel.name(),
                                job.notification.id,
                                job.recipient,
                                attempts
                            );
                            delivered_for_worker.fetch_add(1, Ordering::SeqCst);
                        }
                        Err((DeliveryError::NotConfigured(reason), _)) => {
                            warn!(
                                "Delivery: {} skipped for {}: {}",
                                channel.name(),
                                job.notification.id,
                                reason
                            );
                        }
                        Err((e, attempts)) => {
                            error!(
                                "Delivery: {} gave up on {} for {} after {} attempt(s): {}",
                                channel.name(),
                                job.notification.id,
                                job.recipient,
                                attempts,
                                e
                            );
                            let letter = DeadLetter {
                                job: job.clone(),
                                channel: channel.name().to_string(),
                                error: e.to_string(),
                                attempts,
                                failed_at: Utc::now(),
                            };
                            if let Ok(mut dead) = dead_for_worker.lock() {
                                dead.push(letter);
                            }
                        }
                    }
                }
            }
            debug!("Delivery: worker exiting");
        });

        Self {
            sender: Some(sender),
            worker: Some(worker),
            dead_letters,
            delivered,
        }
    }

    /// Queue a job without blocking. Returns false if the queue is full or stopped.
    pub fn enqueue(&self, job: DeliveryJob) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            warn!("Delivery: queue stopped, dropping {}", job.notification.id);
            return false;
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!("Delivery: queue full, rejected {}", job.notification.id);
                false
            }
            Err(TrySendError::Disconnected(job)) => {
                error!("Delivery: worker gone, dropping {}", job.notification.id);
                false
            }
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .map(|dead| dead.clone())
            .unwrap_or_default()
    }

    /// Successful (channel, job) deliveries so far.
    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Close the queue, let the worker drain it and return the dead letters.
    pub fn shutdown(&mut self) -> Vec<DeadLetter> {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Delivery: worker thread panicked");
            }
        }
        self.dead_letters()
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Append dead letters to a JSON array file.
pub fn persist_dead_letters(path: &Path, letters: &[DeadLetter]) -> Result<()> {
    if letters.is_empty() {
        return Ok(());
    }
    let mut all: Vec<DeadLetter> = match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Delivery: ignoring unreadable dead-letter file {:?}: {}", path, e);
            Vec::new()
        }),
        Err(_) => Vec::new(),
    };
    all.extend_from_slice(letters);
    let json = serde_json::to_string_pretty(&all).context("Failed to serialize dead letters")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write dead letters {:?}", path))?;
    info!("Delivery: wrote {} dead letter(s) to {:?}", letters.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertKind, Severity};
    use std::cell::Cell;

    struct ScriptedChannel {
        name: &'static str,
        script: Vec<Result<(), DeliveryError>>,
        calls: Arc<AtomicUsize>,
    }

    impl AlertChannel for ScriptedChannel {
        fn send(&mut self, _job: &DeliveryJob) -> Result<(), DeliveryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.get(n).cloned().unwrap_or(Ok(()))
        }

        fn id(&self) -> &str {
            self.name
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn scripted(script: Vec<Result<(), DeliveryError>>) -> (ScriptedChannel, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            ScriptedChannel {
                name: "scripted",
                script,
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn job() -> DeliveryJob {
        DeliveryJob {
            notification: Notification::new(
                AlertKind::Temperature,
                "GJ-01-LIVE",
                "High temperature 31°C".to_string(),
                "31°C".to_string(),
                Severity::Critical,
                Utc::now(),
            ),
            recipient: "ops@example.com".to_string(),
        }
    }

    fn no_sleep(_: Duration) {}

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let (mut channel, calls) = scripted(vec![
            Err(DeliveryError::Transient("503".to_string())),
            Ok(()),
        ]);
        let waited = Cell::new(Duration::ZERO);
        let sleep = |d: Duration| waited.set(waited.get() + d);
        let result = deliver_with_retry(&mut channel, &job(), &RetryPolicy::default(), &sleep);
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(waited.get(), Duration::from_millis(500));
    }

    #[test]
    fn test_permanent_errors_are_not_retried() {
        let (mut channel, calls) = scripted(vec![Err(DeliveryError::Permanent("400".to_string()))]);
        let result = deliver_with_retry(&mut channel, &job(), &RetryPolicy::default(), &no_sleep);
        assert_eq!(result, Err((DeliveryError::Permanent("400".to_string()), 1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exhausted_job_becomes_dead_letter() {
        let transient = || Err(DeliveryError::Transient("timeout".to_string()));
        let (channel, calls) = scripted(vec![transient(), transient(), transient()]);
        let mut queue = DeliveryQueue::start_with_sleep(
            vec![Box::new(channel)],
            RetryPolicy::default(),
            4,
            no_sleep,
        );
        assert!(queue.enqueue(job()));
        let dead = queue.shutdown();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);
        assert_eq!(dead[0].job.notification.id, "temp-GJ-01-LIVE");
        assert_eq!(queue.delivered_count(), 0);
        assert!(!queue.enqueue(job()));
    }

    #[test]
    fn test_not_configured_is_skipped_without_dead_letter() {
        let (channel, _) = scripted(vec![Err(DeliveryError::NotConfigured("no keys".to_string()))]);
        let mut queue =
            DeliveryQueue::start_with_sleep(vec![Box::new(channel)], RetryPolicy::default(), 4, no_sleep);
        queue.enqueue(job());
        assert!(queue.shutdown().is_empty());
    }

    #[test]
    fn test_persist_dead_letters_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead-letters.json");
        let letter = DeadLetter {
            job: job(),
            channel: "EmailJS".to_string(),
            error: "permanent delivery failure: 400".to_string(),
            attempts: 1,
            failed_at: Utc::now(),
        };
        persist_dead_letters(&path, &[letter.clone()]).unwrap();
        persist_dead_letters(&path, &[letter]).unwrap();
        let stored: Vec<DeadLetter> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored.len(), 2);
    }
}
