//! State shared by the caller, dispatch, service, and connection threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use ut_control_config::Config;

use crate::message::Message;
use crate::queue::{EnqueueError, MessageQueue};
use crate::registry::Registry;

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) queue: MessageQueue,
    registry: Arc<RwLock<Registry>>,
    exit: AtomicBool,
    pub(crate) service_interval: Duration,
    pub(crate) head_timeout: Duration,
    pub(crate) max_message_bytes: usize,
    pub(crate) max_connections: usize,
}

impl Shared {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            queue: MessageQueue::new(config.queue_capacity()),
            registry: Arc::new(RwLock::new(Registry::new(config.max_callback_entries()))),
            exit: AtomicBool::new(false),
            service_interval: config.service_interval(),
            head_timeout: config.head_timeout(),
            max_message_bytes: config.max_message_bytes(),
            max_connections: config.max_connections(),
        }
    }

    /// Fresh queue and exit flag around the same registry.
    pub(crate) fn renewed(&self) -> Self {
        Self {
            queue: MessageQueue::new(self.queue.capacity()),
            registry: Arc::clone(&self.registry),
            exit: AtomicBool::new(false),
            service_interval: self.service_interval,
            head_timeout: self.head_timeout,
            max_message_bytes: self.max_message_bytes,
            max_connections: self.max_connections,
        }
    }

    pub(crate) fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn registry_mut(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    pub(crate) fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
    }

    pub(crate) fn clear_exit(&self) {
        self.exit.store(false, Ordering::Release);
    }

    /// Queues a received payload for dispatch.
    pub(crate) fn submit(&self, payload: Vec<u8>) -> Result<(), EnqueueError> {
        self.queue.enqueue(Message::DataReceived(payload))
    }
}
