//! In-process broker provider.
//!
//! Mirrors the default-exchange behaviour of a real broker closely enough for
//! tests and local development:
//! - publishing to an undeclared queue silently drops the message
//! - redeclaring a queue with different arguments is refused
//! - `max_length` drops the oldest message (drop-head overflow)
//!
//! Message TTL is recorded but not enforced. Failure injection hooks
//! (`set_reachable`, `fail_sends`, `fail_declare`, `sever`) let tests drive the
//! degraded paths.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Notify};

use crate::broker::{
    BrokerError, BrokerProvider, ConsumeOutcome, MessageHandler, QueueStats,
};
use crate::delivery::channels::ChannelSpec;
use crate::delivery::message::DeliveryOptions;

/// Pause before a requeued message is offered again.
const REDELIVERY_DELAY: Duration = Duration::from_millis(10);

/// A message sitting in an in-memory queue.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub payload: Value,
    pub options: DeliveryOptions,
}

#[derive(Debug)]
struct MemoryQueue {
    spec: ChannelSpec,
    messages: VecDeque<StoredMessage>,
    consumers: u32,
}

impl MemoryQueue {
    fn push(&mut self, message: StoredMessage) {
        self.messages.push_back(message);
        let max = self.spec.max_length as usize;
        while max > 0 && self.messages.len() > max {
            self.messages.pop_front();
        }
    }
}

/// In-memory `BrokerProvider`.
#[derive(Debug)]
pub struct InMemoryProvider {
    queues: DashMap<String, MemoryQueue>,
    connected: AtomicBool,
    reachable: AtomicBool,
    fail_sends: AtomicBool,
    failing_declares: Mutex<HashSet<String>>,
    arrivals: Notify,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            connected: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            failing_declares: Mutex::new(HashSet::new()),
            arrivals: Notify::new(),
        }
    }

    /// A provider whose `connect` always fails.
    pub fn unreachable() -> Self {
        let provider = Self::new();
        provider.set_reachable(false);
        provider
    }

    /// Control whether subsequent `connect` calls succeed.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every publish fail while connected.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make declarations of `queue` fail.
    pub fn fail_declare(&self, queue: &str) {
        self.failing_declares
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(queue.to_string());
    }

    /// Drop the connection as if the broker went away.
    pub fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.arrivals.notify_waiters();
    }

    /// Payloads currently queued on `queue`, oldest first.
    pub fn messages(&self, queue: &str) -> Vec<Value> {
        self.deliveries(queue)
            .into_iter()
            .map(|m| m.payload)
            .collect()
    }

    /// Payloads and publish options currently queued on `queue`.
    pub fn deliveries(&self, queue: &str) -> Vec<StoredMessage> {
        self.queues
            .get(queue)
            .map(|q| q.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Policy `queue` was declared with.
    pub fn declared_spec(&self, queue: &str) -> Option<ChannelSpec> {
        self.queues.get(queue).map(|q| q.spec.clone())
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn try_send(&self, queue: &str, payload: &Value, options: &DeliveryOptions) -> Result<(), BrokerError> {
        if !self.connected() {
            return Err(BrokerError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BrokerError::Rejected {
                queue: queue.to_string(),
            });
        }

        match self.queues.get_mut(queue) {
            Some(mut q) => {
                q.push(StoredMessage {
                    payload: payload.clone(),
                    options: options.clone(),
                });
                drop(q);
                self.arrivals.notify_waiters();
            }
            None => {
                tracing::debug!(queue = %queue, "No such queue, message dropped");
            }
        }
        Ok(())
    }

    fn try_declare(&self, name: &str, spec: &ChannelSpec) -> Result<(), BrokerError> {
        if !self.connected() {
            return Err(BrokerError::NotConnected);
        }
        let failing = self
            .failing_declares
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(name);
        if failing {
            return Err(BrokerError::Unreachable(format!("declare of {} refused", name)));
        }

        let wanted = ChannelSpec {
            name: name.to_string(),
            ..spec.clone()
        };
        let existing = self.queues.entry(name.to_string()).or_insert_with(|| MemoryQueue {
            spec: wanted.clone(),
            messages: VecDeque::new(),
            consumers: 0,
        });
        if existing.spec != wanted {
            return Err(BrokerError::Conflict {
                queue: name.to_string(),
            });
        }
        Ok(())
    }

    fn pop(&self, queue: &str) -> Option<StoredMessage> {
        self.queues.get_mut(queue).and_then(|mut q| q.messages.pop_front())
    }

    fn requeue(&self, queue: &str, message: StoredMessage) {
        if let Some(mut q) = self.queues.get_mut(queue) {
            q.messages.push_front(message);
        }
    }

    fn adjust_consumers(&self, queue: &str, delta: i32) {
        if let Some(mut q) = self.queues.get_mut(queue) {
            q.consumers = q.consumers.saturating_add_signed(delta);
        }
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> bool {
        if !self.reachable.load(Ordering::SeqCst) {
            tracing::warn!(provider = "memory", "Broker unreachable");
            return false;
        }
        self.connected.store(true, Ordering::SeqCst);
        true
    }

    async fn disconnect(&self) {
        self.sever();
    }

    async fn is_connected(&self) -> bool {
        self.connected()
    }

    async fn send(&self, queue: &str, payload: &Value, options: &DeliveryOptions) -> bool {
        match self.try_send(queue, payload, options) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(queue = %queue, error = %e, "Publish failed");
                false
            }
        }
    }

    async fn receive(
        &self,
        queue: &str,
        handler: MessageHandler,
        outcomes: mpsc::UnboundedSender<ConsumeOutcome>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> bool {
        if !self.connected() || !self.queues.contains_key(queue) {
            tracing::warn!(queue = %queue, "Cannot consume: not connected or queue missing");
            return false;
        }

        self.adjust_consumers(queue, 1);
        tracing::info!(queue = %queue, "Consumer started");

        loop {
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            if !self.connected() {
                break;
            }

            if let Some(message) = self.pop(queue) {
                let outcome = match handler(message.payload.clone()) {
                    Ok(()) => ConsumeOutcome::Acked,
                    Err(e) => {
                        tracing::warn!(queue = %queue, error = %e, "Handler failed, requeueing");
                        self.requeue(queue, message);
                        ConsumeOutcome::Requeued {
                            error: e.to_string(),
                        }
                    }
                };
                let requeued = matches!(outcome, ConsumeOutcome::Requeued { .. });
                let _ = outcomes.send(outcome);

                if requeued {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(REDELIVERY_DELAY) => {}
                    }
                } else if shutdown_fired(&mut shutdown) {
                    break;
                }
                continue;
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = &mut arrival => {}
            }
        }

        self.adjust_consumers(queue, -1);
        tracing::info!(queue = %queue, "Consumer stopped");
        true
    }

    async fn create_queue(&self, name: &str, spec: &ChannelSpec) -> bool {
        match self.try_declare(name, spec) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(queue = %name, error = %e, "Queue declaration failed");
                false
            }
        }
    }

    async fn delete_queue(&self, name: &str) -> bool {
        if !self.connected() {
            tracing::warn!(queue = %name, "Cannot delete queue: not connected");
            return false;
        }
        if let Some((_, q)) = self.queues.remove(name) {
            tracing::debug!(queue = %name, purged = q.messages.len(), "Queue deleted");
        }
        true
    }

    async fn stats(&self, name: &str) -> Option<QueueStats> {
        if !self.connected() {
            return None;
        }
        self.queues.get(name).map(|q| QueueStats {
            queue: name.to_string(),
            message_count: q.messages.len() as u32,
            consumer_count: q.consumers,
        })
    }
}

fn shutdown_fired(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        shutdown.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}
