//! Hands newly seen alerts to the delivery queue, once per alert id and recipient.

use super::delivery::{DeadLetter, DeliveryJob, DeliveryQueue};
use super::Notification;
use crate::store::StateStore;
use anyhow::Result;
use tracing::{debug, info, warn};

pub struct AlertDispatcher {
    store: StateStore,
    queue: DeliveryQueue,
    default_recipient: String,
    /// Alerts the queue rejected; offered again on the next `dispatch`.
    pending: Vec<Notification>,
}

impl AlertDispatcher {
    pub fn new(store: StateStore, queue: DeliveryQueue, default_recipient: String) -> Self {
        Self {
            store,
            queue,
            default_recipient,
            pending: Vec::new(),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn recipient(&self) -> String {
        self.store.alert_recipient(&self.default_recipient)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Enqueue every notification not yet sent to the current recipient and record it as
    /// sent. Returns how many were enqueued.
    ///
    /// The state file is re-read first, so a login or recipient change saved elsewhere
    /// takes effect and is not overwritten. Alerts the queue rejects are kept and retried
    /// on the next call, even if that call brings no new alerts.
    pub fn dispatch(&mut self, notifications: &[Notification]) -> Result<usize> {
        self.store.reload();
        let recipient = self.recipient();

        let mut batch = std::mem::take(&mut self.pending);
        batch.retain(|p| !notifications.iter().any(|n| n.id == p.id));
        batch.extend(notifications.iter().cloned());

        let mut enqueued = 0;
        for n in batch {
            if self.store.was_sent(&recipient, &n.id) {
                debug!("Dispatch: {} already sent to {}", n.id, recipient);
                continue;
            }
            let job = DeliveryJob {
                notification: n.clone(),
                recipient: recipient.clone(),
            };
            if self.queue.enqueue(job) {
                self.store.mark_sent(&recipient, &n.id);
                enqueued += 1;
            } else {
                self.pending.push(n);
            }
        }
        if !self.pending.is_empty() {
            warn!("Dispatch: {} alert(s) waiting for queue space", self.pending.len());
        }
        if enqueued > 0 {
            info!("Dispatch: queued {} alert(s) for {}", enqueued, recipient);
            self.store.save()?;
        }
        Ok(enqueued)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.queue.dead_letters()
    }

    /// Drain the queue and return what could not be delivered.
    pub fn shutdown(&mut self) -> Vec<DeadLetter> {
        self.queue.shutdown()
    }
}
