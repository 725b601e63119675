//! Hand-off of routed events to the run-scheduling system

use crate::{events::RoutedEvent, Result, WebhookError};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Accepts routed events for workflow execution
#[async_trait]
pub trait RunScheduler: Send + Sync {
    async fn schedule(&self, event: RoutedEvent) -> Result<()>;
}

/// Run scheduler that forwards events over a bounded channel
#[derive(Clone)]
pub struct ChannelRunScheduler {
    sender: mpsc::Sender<RoutedEvent>,
}

impl ChannelRunScheduler {
    /// Create a scheduler and the receiving end of its channel
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<RoutedEvent>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl RunScheduler for ChannelRunScheduler {
    async fn schedule(&self, event: RoutedEvent) -> Result<()> {
        debug!(
            trigger_id = %event.trigger_id,
            delivery_id = %event.event.delivery_id,
            "Scheduling workflow run"
        );
        self.sender
            .send(event)
            .await
            .map_err(|_| WebhookError::Scheduling("run channel closed".to_string()))
    }
}

/// Drains a [`ChannelRunScheduler`] channel
pub struct RunEventProcessor {
    receiver: mpsc::Receiver<RoutedEvent>,
    on_event: Option<Box<dyn Fn(RoutedEvent) + Send + Sync>>,
}

impl RunEventProcessor {
    pub fn new(receiver: mpsc::Receiver<RoutedEvent>) -> Self {
        Self {
            receiver,
            on_event: None,
        }
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(RoutedEvent) + Send + Sync + 'static,
    {
        self.on_event = Some(Box::new(callback));
        self
    }

    pub async fn run(mut self) {
        info!("Starting run event processor");

        while let Some(event) = self.receiver.recv().await {
            if let Some(ref callback) = self.on_event {
                callback(event);
            }
        }

        info!("Run event processor stopped");
    }
}
