//! In-memory broker.
//!
//! Implements the broker traits inside the process: exchanges route to bound
//! queues, queues buffer messages until a consumer reads them, and redeclares
//! with different parameters are rejected like a real broker would. Suitable
//! for tests and single-process deployments.

use crate::broker::{
    BrokerChannel, BrokerConnection, BrokerConnector, DeliveryStream, MessageProperties,
};
use crate::error::{EventError, EventResult};
use crate::topology::{ExchangeSpec, QueueSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};

/// A message recorded by the broker at publish time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Target exchange
    pub exchange: String,
    /// Routing key
    pub routing_key: String,
    /// Message body
    pub body: Vec<u8>,
    /// Message properties
    pub properties: MessageProperties,
}

/// Broker statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBrokerStats {
    /// Connections opened
    pub connections_opened: usize,
    /// Channels opened
    pub channels_opened: usize,
    /// Exchange declarations received (including redeclares)
    pub exchange_declares: usize,
    /// Messages published
    pub messages_published: usize,
}

struct ExchangeEntry {
    spec: ExchangeSpec,
    bindings: Vec<(String, String)>,
}

struct MemoryQueue {
    spec: QueueSpec,
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

#[derive(Default)]
struct BrokerState {
    exchanges: RwLock<HashMap<String, ExchangeEntry>>,
    queues: RwLock<HashMap<String, Arc<MemoryQueue>>>,
    published: RwLock<Vec<PublishedMessage>>,
    unavailable: AtomicBool,
    connections_opened: AtomicUsize,
    channels_opened: AtomicUsize,
    exchange_declares: AtomicUsize,
    messages_published: AtomicUsize,
    connect_delay_ms: AtomicUsize,
}

impl BrokerState {
    fn ensure_available(&self) -> EventResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(EventError::Transport("Broker unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// In-memory broker. Clones share the same exchanges and queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("available", &self.is_available())
            .finish()
    }
}

impl MemoryBroker {
    /// Create a new in-memory broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the broker reachable or unreachable.
    ///
    /// While unreachable, connects and every channel operation fail with a
    /// transport error.
    pub fn set_available(&self, available: bool) {
        self.state.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Whether the broker is reachable.
    pub fn is_available(&self) -> bool {
        !self.state.unavailable.load(Ordering::SeqCst)
    }

    /// Delay every connect by the given duration.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state
            .connect_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Get broker statistics.
    pub fn stats(&self) -> MemoryBrokerStats {
        MemoryBrokerStats {
            connections_opened: self.state.connections_opened.load(Ordering::SeqCst),
            channels_opened: self.state.channels_opened.load(Ordering::SeqCst),
            exchange_declares: self.state.exchange_declares.load(Ordering::SeqCst),
            messages_published: self.state.messages_published.load(Ordering::SeqCst),
        }
    }

    /// Messages published so far, in publish order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.published.read().await.clone()
    }

    /// Number of messages waiting in a queue.
    ///
    /// Waits for the queue's receiver, so call it while no consumer is
    /// blocked on the queue.
    pub async fn queue_depth(&self, queue: &str) -> Option<usize> {
        let queues = self.state.queues.read().await;
        let queue = queues.get(queue)?;
        let receiver = queue.receiver.lock().await;
        Some(receiver.len())
    }

    /// Put raw bytes straight onto a queue, bypassing exchanges.
    pub async fn inject(&self, queue: &str, body: Vec<u8>) -> EventResult<()> {
        let queues = self.state.queues.read().await;
        let queue = queues
            .get(queue)
            .ok_or_else(|| EventError::Transport(format!("Queue not found: {}", queue)))?;
        queue
            .sender
            .send(body)
            .map_err(|_| EventError::Transport("Queue closed".to_string()))
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self) -> EventResult<Box<dyn BrokerConnection>> {
        let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        self.state.ensure_available()?;
        self.state.connections_opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryConnection {
            state: self.state.clone(),
            open: Arc::new(AtomicBool::new(true)),
        }))
    }
}

struct MemoryConnection {
    state: Arc<BrokerState>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn open_channel(&self) -> EventResult<Arc<dyn BrokerChannel>> {
        self.state.ensure_available()?;
        if !self.open.load(Ordering::SeqCst) {
            return Err(EventError::Transport("Connection closed".to_string()));
        }

        self.state.channels_opened.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MemoryChannel {
            state: self.state.clone(),
            connection_open: self.open.clone(),
            open: AtomicBool::new(true),
        }))
    }

    async fn close(&self) -> EventResult<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryChannel {
    state: Arc<BrokerState>,
    connection_open: Arc<AtomicBool>,
    open: AtomicBool,
}

impl MemoryChannel {
    fn ensure_usable(&self) -> EventResult<()> {
        self.state.ensure_available()?;
        if !self.open.load(Ordering::SeqCst) || !self.connection_open.load(Ordering::SeqCst) {
            return Err(EventError::Transport("Channel closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> EventResult<()> {
        self.ensure_usable()?;
        self.state.exchange_declares.fetch_add(1, Ordering::SeqCst);

        let mut exchanges = self.state.exchanges.write().await;
        match exchanges.get(&spec.name) {
            Some(existing) if existing.spec != *spec => Err(EventError::Topology(format!(
                "Exchange '{}' already declared with different parameters",
                spec.name
            ))),
            Some(_) => Ok(()),
            None => {
                exchanges.insert(
                    spec.name.clone(),
                    ExchangeEntry {
                        spec: spec.clone(),
                        bindings: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> EventResult<()> {
        self.ensure_usable()?;

        let mut queues = self.state.queues.write().await;
        match queues.get(&spec.name) {
            Some(existing) if existing.spec != *spec => Err(EventError::Topology(format!(
                "Queue '{}' already declared with different parameters",
                spec.name
            ))),
            Some(_) => Ok(()),
            None => {
                let (sender, receiver) = mpsc::unbounded_channel();
                queues.insert(
                    spec.name.clone(),
                    Arc::new(MemoryQueue {
                        spec: spec.clone(),
                        sender,
                        receiver: Mutex::new(receiver),
                    }),
                );
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> EventResult<()> {
        self.ensure_usable()?;

        if !self.state.queues.read().await.contains_key(queue) {
            return Err(EventError::Topology(format!("Queue not found: {}", queue)));
        }

        let mut exchanges = self.state.exchanges.write().await;
        let entry = exchanges
            .get_mut(exchange)
            .ok_or_else(|| EventError::Topology(format!("Exchange not found: {}", exchange)))?;

        let binding = (queue.to_string(), routing_key.to_string());
        if !entry.bindings.contains(&binding) {
            entry.bindings.push(binding);
        }

        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> EventResult<()> {
        self.ensure_usable()?;

        let targets: Vec<String> = {
            let exchanges = self.state.exchanges.read().await;
            let entry = exchanges.get(exchange).ok_or_else(|| {
                EventError::Transport(format!("Exchange not found: {}", exchange))
            })?;

            // Fanout: every bound queue gets a copy regardless of key.
            entry
                .bindings
                .iter()
                .map(|(queue, _)| queue.clone())
                .collect()
        };

        {
            let queues = self.state.queues.read().await;
            for name in &targets {
                if let Some(queue) = queues.get(name) {
                    let _ = queue.sender.send(body.clone());
                }
            }
        }

        self.state.messages_published.fetch_add(1, Ordering::SeqCst);
        self.state.published.write().await.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body,
            properties,
        });

        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> EventResult<DeliveryStream> {
        self.ensure_usable()?;

        let queue = self
            .state
            .queues
            .read()
            .await
            .get(queue)
            .cloned()
            .ok_or_else(|| EventError::Transport(format!("Queue not found: {}", queue)))?;

        // Competing consumers share the queue's receiver.
        let stream = futures::stream::unfold(queue, |queue| async move {
            let next = queue.receiver.lock().await.recv().await;
            next.map(|body| (Ok::<_, EventError>(body), queue))
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self) -> EventResult<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}
