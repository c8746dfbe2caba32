//! Messaging transport: Bot API over HTTPS

use crate::protocol::{
    AnswerCallbackParams, ApiResponse, EditReplyMarkupParams, GetUpdatesParams, InlineKeyboard,
    SendMessageParams, SentMessage, Update,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("API error: {0}")]
    Api(String),
}

/// One outbound text message, optionally editing an earlier one in place.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: String,
    pub text: String,
    pub markup: Option<InlineKeyboard>,
    pub edit_message_id: Option<i64>,
}

impl OutboundMessage {
    pub fn new(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            markup: None,
            edit_message_id: None,
        }
    }

    pub fn with_markup(mut self, markup: InlineKeyboard) -> Self {
        self.markup = Some(markup);
        self
    }

    pub fn editing(mut self, message_id: i64) -> Self {
        self.edit_message_id = Some(message_id);
        self
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends (or edits) a message and returns its message id.
    async fn send(&self, message: &OutboundMessage) -> Result<i64, TransportError>;

    async fn edit_reply_markup(
        &self,
        chat_id: &str,
        message_id: i64,
        markup: &InlineKeyboard,
    ) -> Result<(), TransportError>;

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), TransportError>;

    /// Long-polls for updates with ids `>= offset`.
    async fn poll(&self, offset: i64) -> Result<Vec<Update>, TransportError>;
}

pub struct BotApi {
    client: reqwest::Client,
    base_url: String,
    send_timeout: Duration,
    poll_timeout: Duration,
}

impl BotApi {
    pub fn new(api_base: &str, token: &str, send_timeout: Duration, poll_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            send_timeout,
            poll_timeout,
        }
    }

    async fn call<P, T>(&self, method: &str, params: &P, timeout: Duration) -> Result<T, TransportError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(params)
            .timeout(timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiResponse<T> = resp.json().await?;
        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TransportError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| format!("{method} returned no result")),
            )),
        }
    }
}

#[async_trait::async_trait]
impl Transport for BotApi {
    async fn send(&self, message: &OutboundMessage) -> Result<i64, TransportError> {
        let method = if message.edit_message_id.is_some() {
            "editMessageText"
        } else {
            "sendMessage"
        };
        let params = SendMessageParams {
            chat_id: &message.chat_id,
            text: &message.text,
            parse_mode: "HTML",
            reply_markup: message.markup.as_ref(),
            message_id: message.edit_message_id,
        };
        debug!(chat_id = %message.chat_id, method, "sending message");
        let sent: SentMessage = self.call(method, &params, self.send_timeout).await?;
        Ok(sent.message_id)
    }

    async fn edit_reply_markup(
        &self,
        chat_id: &str,
        message_id: i64,
        markup: &InlineKeyboard,
    ) -> Result<(), TransportError> {
        let params = EditReplyMarkupParams {
            chat_id,
            message_id,
            reply_markup: markup,
        };
        let _: serde_json::Value = self
            .call("editMessageReplyMarkup", &params, self.send_timeout)
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), TransportError> {
        let params = AnswerCallbackParams {
            callback_query_id: callback_id,
            text,
        };
        let _: bool = self
            .call("answerCallbackQuery", &params, self.send_timeout)
            .await?;
        Ok(())
    }

    async fn poll(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        let params = GetUpdatesParams {
            offset,
            timeout: self.poll_timeout.as_secs(),
        };
        // Leave headroom over the server-side long-poll wait
        let timeout = self.poll_timeout + Duration::from_secs(10);
        self.call("getUpdates", &params, timeout).await
    }
}
