//! Alert dispatch with the quiet-hours gate

use crate::batcher::Batch;
use crate::collector::ProcessInfo;
use crate::messages;
use crate::recipient::RecipientConfig;
use crate::transport::{OutboundMessage, Transport};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent(i64),
    /// Dropped: the recipient was inside its quiet hours.
    Suppressed,
    Failed,
}

pub struct Notifier {
    transport: Arc<dyn Transport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Sends an alert unless `now` falls in the recipient's quiet hours.
    /// Suppressed alerts are not retried.
    pub async fn alert(
        &self,
        config: &RecipientConfig,
        message: OutboundMessage,
        now: DateTime<Local>,
    ) -> Delivery {
        if config.is_quiet_at(now.time()) {
            info!(chat_id = %message.chat_id, "Quiet hours, alert dropped");
            return Delivery::Suppressed;
        }
        match self.transport.send(&message).await {
            Ok(id) => Delivery::Sent(id),
            Err(e) => {
                error!(chat_id = %message.chat_id, "Failed to send alert: {}", e);
                Delivery::Failed
            }
        }
    }

    pub async fn send_single(
        &self,
        recipient: &str,
        config: &RecipientConfig,
        info: &ProcessInfo,
        now: DateTime<Local>,
    ) -> Delivery {
        let message = OutboundMessage::new(recipient, messages::format_single(info))
            .with_markup(messages::process_keyboard(&info.name));
        self.alert(config, message, now).await
    }

    pub async fn send_batch(
        &self,
        recipient: &str,
        config: &RecipientConfig,
        batch: &Batch,
        now: DateTime<Local>,
    ) -> Delivery {
        match batch {
            Batch::Single(info) => self.send_single(recipient, config, info, now).await,
            Batch::Grouped(processes) => {
                let message = OutboundMessage::new(recipient, messages::format_grouped(processes));
                self.alert(config, message, now).await
            }
        }
    }

    /// Direct reply to a recipient's own command. Not subject to quiet hours.
    pub async fn reply(&self, message: OutboundMessage) -> Option<i64> {
        match self.transport.send(&message).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(chat_id = %message.chat_id, "Failed to send reply: {}", e);
                None
            }
        }
    }
}
