//! Fire-and-forget booking notifications.
//!
//! The orchestrator hands each [`Notification`] to a [`Notifier`], which
//! queues it for a background worker. The worker delivers through a
//! [`NotificationPublisher`] with bounded retries; a notification that
//! still fails is logged and dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use speakin_types::{AccountId, BookingId, Credits, Party, SessionType};

use crate::model::{AvailabilitySlot, Booking};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmed,
    BookingCanceled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub booking_id: BookingId,
    pub student_id: AccountId,
    pub tutor_id: AccountId,
    pub session_type: SessionType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub credits: Credits,
    pub video_call_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_by: Option<Party>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn for_booking(kind: NotificationKind, booking: &Booking, slot: &AvailabilitySlot, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            booking_id: booking.id,
            student_id: booking.student_id,
            tutor_id: slot.tutor_id,
            session_type: slot.session_type,
            start_time: slot.start_time,
            end_time: slot.end_time,
            credits: slot.credits_required,
            video_call_link: booking.video_call_link.clone(),
            canceled_by: None,
            created_at: now,
        }
    }

    pub fn confirmed(booking: &Booking, slot: &AvailabilitySlot, now: DateTime<Utc>) -> Self {
        Self::for_booking(NotificationKind::BookingConfirmed, booking, slot, now)
    }

    pub fn canceled(booking: &Booking, slot: &AvailabilitySlot, by: Party, now: DateTime<Utc>) -> Self {
        Self {
            canceled_by: Some(by),
            ..Self::for_booking(NotificationKind::BookingCanceled, booking, slot, now)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification endpoint answered {status}")]
    Status { status: u16 },
}

/// Delivery backend for notifications.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), PublishError>;
}

/// Exponential backoff between delivery attempts.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (0-based), capped at
    /// `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(ms as u64).min(self.max_delay)
    }
}

/// Handle for queueing notifications. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl Notifier {
    /// Start the delivery worker. It runs until every `Notifier` clone is
    /// dropped and the queue is drained.
    pub fn spawn(publisher: Arc<dyn NotificationPublisher>, retry: RetryPolicy) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        let worker = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                deliver(publisher.as_ref(), &retry, &notification).await;
            }
            debug!("notification worker stopped");
        });
        (Self { tx: Some(tx) }, worker)
    }

    /// A notifier that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue a notification without waiting for delivery.
    pub fn publish(&self, notification: Notification) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.send(notification) {
            warn!(booking = %e.0.booking_id.short_id(), "notification worker gone; dropping notification");
        }
    }
}

async fn deliver(publisher: &dyn NotificationPublisher, retry: &RetryPolicy, notification: &Notification) {
    let attempts = retry.max_attempts.max(1);
    for attempt in 0..attempts {
        match publisher.publish(notification).await {
            Ok(()) => {
                debug!(id = %notification.id, kind = ?notification.kind, attempt, "notification delivered");
                return;
            }
            Err(e) if attempt + 1 < attempts => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(id = %notification.id, attempt, error = %e, ?delay, "notification failed; retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(
                    id = %notification.id,
                    booking = %notification.booking_id.short_id(),
                    attempts,
                    error = %e,
                    "notification dropped after final attempt"
                );
            }
        }
    }
}

/// Writes notifications to the log.
pub struct LogPublisher;

#[async_trait]
impl NotificationPublisher for LogPublisher {
    async fn publish(&self, n: &Notification) -> Result<(), PublishError> {
        info!(
            kind = ?n.kind,
            booking = %n.booking_id.short_id(),
            student = %n.student_id.short_id(),
            tutor = %n.tutor_id.short_id(),
            start = %n.start_time,
            link = %n.video_call_link,
            "booking notification"
        );
        Ok(())
    }
}

/// Keeps delivered notifications in memory. Can be told to fail the first
/// few attempts.
#[derive(Default)]
pub struct MemoryPublisher {
    received: Mutex<Vec<Notification>>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().expect("lock poisoned").clone()
    }

    /// Attempts made, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` notifications arrived or `limit` passes.
    pub async fn wait_for_count(&self, count: usize, limit: Duration) -> Vec<Notification> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let received = self.received();
            if received.len() >= count || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl NotificationPublisher for MemoryPublisher {
    async fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(PublishError::Transport("injected failure".into()));
        }
        self.received.lock().expect("lock poisoned").push(notification.clone());
        Ok(())
    }
}

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl NotificationPublisher for WebhookPublisher {
    async fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PublishError::Status { status: status.as_u16() })
        }
    }
}
