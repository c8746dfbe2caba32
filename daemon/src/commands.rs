//! Recipient commands and button presses

use crate::messages;
use crate::notifier::Notifier;
use crate::protocol::{CallbackQuery, InlineKeyboard, Message, Update};
use crate::recipient::QuietHours;
use crate::state::StateManager;
use crate::transport::OutboundMessage;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const TOP_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum QuietSetting {
    Off,
    Range(QuietHours),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Help,
    Settings,
    List,
    Whitelist,
    Stats,
    History(String),
    Quiet(QuietSetting),
    SetCpu(f64),
    SetRam(f64),
    SetGroupWindow(u64),
    Ignore(String),
    Unignore(String),
    Allow(String),
    Disallow(String),
    Unknown(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("usage: {0}")]
    MissingArgument(&'static str),
    #[error("not a valid number: {0}")]
    InvalidNumber(String),
    #[error("expected HH:MM-HH:MM or off, got {0}")]
    InvalidQuietRange(String),
}

fn required<'a>(arg: Option<&'a str>, usage: &'static str) -> Result<&'a str, CommandError> {
    arg.map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or(CommandError::MissingArgument(usage))
}

fn non_negative(raw: &str) -> Result<f64, CommandError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| CommandError::InvalidNumber(raw.to_string()))
}

/// Parses a text message. `/cmd@botname` is accepted as `/cmd`.
pub fn parse_command(text: &str) -> Result<Command, CommandError> {
    let text = text.trim();
    let (head, arg) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, Some(rest)),
        None => (text, None),
    };
    let head = head.split('@').next().unwrap_or(head);

    let command = match head {
        "/start" => Command::Start,
        "/stop" => Command::Stop,
        "/help" => Command::Help,
        "/settings" => Command::Settings,
        "/list" => Command::List,
        "/whitelist" => Command::Whitelist,
        "/stats" => Command::Stats,
        "/history" => Command::History(required(arg, "/history <process>")?.to_string()),
        "/quiet" => {
            let arg = required(arg, "/quiet HH:MM-HH:MM | off")?;
            if arg.eq_ignore_ascii_case("off") {
                Command::Quiet(QuietSetting::Off)
            } else {
                let range = QuietHours::parse_range(arg)
                    .ok_or_else(|| CommandError::InvalidQuietRange(arg.to_string()))?;
                Command::Quiet(QuietSetting::Range(range))
            }
        }
        "/setcpu" => Command::SetCpu(non_negative(required(arg, "/setcpu <percent>")?)?),
        "/setram" => Command::SetRam(non_negative(required(arg, "/setram <MB>")?)?),
        "/setgroup" => {
            let raw = required(arg, "/setgroup <seconds>")?;
            let secs = raw
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidNumber(raw.to_string()))?;
            Command::SetGroupWindow(secs)
        }
        "/ignore" => Command::Ignore(required(arg, "/ignore <name>")?.to_string()),
        "/unignore" => Command::Unignore(required(arg, "/unignore <name>")?.to_string()),
        "/allow" => Command::Allow(required(arg, "/allow <name>")?.to_string()),
        "/disallow" => Command::Disallow(required(arg, "/disallow <name>")?.to_string()),
        other => Command::Unknown(other.to_string()),
    };
    Ok(command)
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    Ignore(String),
    Unignore(String),
    Whitelist(String),
    Unwhitelist(String),
    ToggleGroup,
    ToggleSystem,
    ToggleStats,
    ToggleSingleMessage,
    CycleMode,
    ToggleQuiet,
    PromptCpu,
    PromptMemory,
    MainMenu,
}

pub fn parse_callback(data: &str) -> Option<CallbackAction> {
    // Longer prefixes first: "unignore_" also ends in "ignore_"
    let prefixed: [(&str, fn(String) -> CallbackAction); 4] = [
        ("unignore_", CallbackAction::Unignore),
        ("unwhitelist_", CallbackAction::Unwhitelist),
        ("ignore_", CallbackAction::Ignore),
        ("whitelist_", CallbackAction::Whitelist),
    ];
    for (prefix, make) in prefixed {
        if let Some(name) = data.strip_prefix(prefix) {
            return (!name.is_empty()).then(|| make(name.to_string()));
        }
    }
    let action = match data {
        "toggle_group" => CallbackAction::ToggleGroup,
        "toggle_system" => CallbackAction::ToggleSystem,
        "toggle_stats" => CallbackAction::ToggleStats,
        "toggle_single" => CallbackAction::ToggleSingleMessage,
        "set_mode" => CallbackAction::CycleMode,
        "set_quiet" => CallbackAction::ToggleQuiet,
        "set_cpu" => CallbackAction::PromptCpu,
        "set_memory" => CallbackAction::PromptMemory,
        "main_menu" => CallbackAction::MainMenu,
        _ => return None,
    };
    Some(action)
}

/// Update id cursor for long polling. Only moves forward.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollCursor {
    last_update_id: i64,
}

impl PollCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_offset(&self) -> i64 {
        self.last_update_id + 1
    }

    pub fn advance(&mut self, updates: &[Update]) {
        if let Some(max) = updates.iter().map(|u| u.update_id).max() {
            self.last_update_id = self.last_update_id.max(max);
        }
    }
}

pub struct CommandHandler {
    state: Arc<StateManager>,
    notifier: Arc<Notifier>,
}

impl CommandHandler {
    pub fn new(state: Arc<StateManager>, notifier: Arc<Notifier>) -> Self {
        Self { state, notifier }
    }

    pub async fn handle_update(&self, update: &Update) {
        if let Some(cq) = &update.callback_query {
            self.handle_callback(cq).await;
        } else if let Some(msg) = &update.message {
            if msg.text.is_some() {
                self.handle_message(msg).await;
            }
        }
    }

    async fn reply(&self, chat_id: &str, text: impl Into<String>) {
        self.notifier
            .reply(OutboundMessage::new(chat_id, text))
            .await;
    }

    pub async fn handle_message(&self, msg: &Message) {
        let Some(text) = msg.text.as_deref() else {
            return;
        };
        let chat_id = msg.chat.id.to_string();
        let username = msg
            .from
            .as_ref()
            .and_then(|u| u.username.as_deref())
            .unwrap_or("unknown");
        info!(chat_id = %chat_id, user = username, "Command: {}", text);

        let command = match parse_command(text) {
            Ok(command) => command,
            Err(e) => {
                self.reply(&chat_id, format!("⚠️ {}", messages::escape_html(&e.to_string())))
                    .await;
                return;
            }
        };

        match command {
            Command::Start => {
                if self.state.activate(&chat_id).await {
                    info!(chat_id = %chat_id, "Recipient activated");
                }
                self.reply(&chat_id, messages::WELCOME).await;
            }
            Command::Stop => {
                if self.state.deactivate(&chat_id).await {
                    info!(chat_id = %chat_id, "Recipient deactivated");
                }
                self.reply(&chat_id, messages::GOODBYE).await;
            }
            _ if !self.state.is_active(&chat_id) => {
                self.reply(&chat_id, messages::NOT_ACTIVE).await;
            }
            command => self.run_command(&chat_id, command).await,
        }
    }

    async fn run_command(&self, chat_id: &str, command: Command) {
        match command {
            Command::Start | Command::Stop => {}
            Command::Help => self.reply(chat_id, messages::HELP).await,
            Command::Settings => self.show_settings(chat_id, None).await,
            Command::List => {
                let names = self.state.ignored_names();
                self.reply(chat_id, messages::format_name_list("🔕 Ignored", &names))
                    .await;
            }
            Command::Whitelist => {
                let names = self.state.whitelisted_names();
                self.reply(chat_id, messages::format_name_list("⭐ Whitelist", &names))
                    .await;
            }
            Command::Stats => {
                let text = self
                    .state
                    .with_stats(|stats| messages::format_top(&stats.top(TOP_LIMIT)));
                self.reply(chat_id, text).await;
            }
            Command::History(name) => {
                let summary = self.state.with_stats(|stats| stats.summary(&name));
                self.reply(chat_id, messages::format_history(&name, summary.as_ref()))
                    .await;
            }
            Command::Quiet(setting) => {
                self.state
                    .update_config(chat_id, |c| match setting {
                        QuietSetting::Off => c.quiet_hours_enabled = false,
                        QuietSetting::Range(range) => {
                            c.quiet_hours_start = range.start;
                            c.quiet_hours_end = range.end;
                            c.quiet_hours_enabled = true;
                        }
                    })
                    .await;
                self.reply(chat_id, "🌙 Quiet hours updated").await;
            }
            Command::SetCpu(value) => {
                self.state
                    .update_config(chat_id, |c| c.min_cpu_percent = value)
                    .await;
                self.reply(chat_id, format!("CPU threshold: {value}%")).await;
            }
            Command::SetRam(value) => {
                self.state
                    .update_config(chat_id, |c| c.min_memory_mb = value)
                    .await;
                self.reply(chat_id, format!("RAM threshold: {value}MB")).await;
            }
            Command::SetGroupWindow(secs) => {
                self.state
                    .update_config(chat_id, |c| c.batch_window_secs = secs)
                    .await;
                self.reply(chat_id, format!("Grouping window: {secs}s")).await;
            }
            Command::Ignore(name) => {
                self.state.ignore(&name).await;
                self.reply(chat_id, format!("🔕 <b>{}</b> ignored", messages::escape_html(&name)))
                    .await;
            }
            Command::Unignore(name) => {
                self.state.unignore(&name).await;
                self.reply(
                    chat_id,
                    format!("🔔 <b>{}</b> removed from ignored", messages::escape_html(&name)),
                )
                .await;
            }
            Command::Allow(name) => {
                self.state.allow(&name).await;
                self.reply(
                    chat_id,
                    format!("⭐ <b>{}</b> added to whitelist", messages::escape_html(&name)),
                )
                .await;
            }
            Command::Disallow(name) => {
                self.state.disallow(&name).await;
                self.reply(
                    chat_id,
                    format!("❌ <b>{}</b> removed from whitelist", messages::escape_html(&name)),
                )
                .await;
            }
            Command::Unknown(_) => self.reply(chat_id, messages::UNKNOWN_COMMAND).await,
        }
    }

    /// Shows the settings menu. Edits `edit_message_id` when given, or the
    /// last menu message when the recipient asked for a single message.
    async fn show_settings(&self, chat_id: &str, edit_message_id: Option<i64>) {
        let config = self.state.recipient_config(chat_id).await;
        let target = edit_message_id.or(config
            .update_single_message
            .then_some(config.last_message_id)
            .flatten());

        let mut message = OutboundMessage::new(chat_id, messages::SETTINGS_TITLE)
            .with_markup(messages::settings_keyboard(&config));
        if let Some(id) = target {
            message = message.editing(id);
        }

        let sent = match self.notifier.reply(message.clone()).await {
            Some(id) => Some(id),
            // Edited message may be gone; fall back to a new one
            None if target.is_some() => {
                message.edit_message_id = None;
                self.notifier.reply(message).await
            }
            None => None,
        };
        if let Some(id) = sent {
            self.state
                .update_config(chat_id, |c| c.last_message_id = Some(id))
                .await;
        }
    }

    pub async fn handle_callback(&self, cq: &CallbackQuery) {
        let Some(msg) = &cq.message else {
            return;
        };
        let chat_id = msg.chat.id.to_string();
        let message_id = msg.message_id;
        let data = cq.data.as_deref().unwrap_or_default();

        let Some(action) = parse_callback(data) else {
            warn!(chat_id = %chat_id, data, "Unknown callback");
            self.answer(cq, "❓").await;
            return;
        };
        if !self.state.is_active(&chat_id) {
            self.answer(cq, "Send /start first").await;
            return;
        }

        match action {
            CallbackAction::Ignore(name) => {
                self.state.ignore(&name).await;
                self.answer(cq, &format!("✅ {name} ignored")).await;
                self.clear_buttons(&chat_id, message_id).await;
                self.reply(
                    &chat_id,
                    format!("🔕 <b>{}</b> added to ignored", messages::escape_html(&name)),
                )
                .await;
            }
            CallbackAction::Unignore(name) => {
                self.state.unignore(&name).await;
                self.answer(cq, &format!("✅ {name} enabled")).await;
                self.reply(
                    &chat_id,
                    format!("🔔 <b>{}</b> removed from ignored", messages::escape_html(&name)),
                )
                .await;
            }
            CallbackAction::Whitelist(name) => {
                self.state.allow(&name).await;
                self.answer(cq, &format!("⭐ {name} whitelisted")).await;
                self.clear_buttons(&chat_id, message_id).await;
                self.reply(
                    &chat_id,
                    format!("⭐ <b>{}</b> added to whitelist", messages::escape_html(&name)),
                )
                .await;
            }
            CallbackAction::Unwhitelist(name) => {
                self.state.disallow(&name).await;
                self.answer(cq, &format!("✅ {name} removed")).await;
                self.reply(
                    &chat_id,
                    format!("❌ <b>{}</b> removed from whitelist", messages::escape_html(&name)),
                )
                .await;
            }
            CallbackAction::ToggleGroup
            | CallbackAction::ToggleSystem
            | CallbackAction::ToggleStats
            | CallbackAction::ToggleSingleMessage
            | CallbackAction::ToggleQuiet => {
                self.state
                    .update_config(&chat_id, |c| match action {
                        CallbackAction::ToggleGroup => c.batching = !c.batching,
                        CallbackAction::ToggleSystem => c.ignore_system = !c.ignore_system,
                        CallbackAction::ToggleStats => c.track_stats = !c.track_stats,
                        CallbackAction::ToggleSingleMessage => {
                            c.update_single_message = !c.update_single_message
                        }
                        _ => c.quiet_hours_enabled = !c.quiet_hours_enabled,
                    })
                    .await;
                self.answer(cq, "✅ Updated").await;
                self.refresh_settings(&chat_id, message_id).await;
            }
            CallbackAction::CycleMode => {
                let mode = self
                    .state
                    .update_config(&chat_id, |c| {
                        c.mode = c.mode.next();
                        c.mode.clone()
                    })
                    .await;
                self.answer(cq, &format!("Mode: {mode}")).await;
                self.refresh_settings(&chat_id, message_id).await;
            }
            CallbackAction::PromptCpu => {
                self.answer(cq, "").await;
                self.reply(&chat_id, "Send the new CPU threshold: /setcpu &lt;number&gt;")
                    .await;
            }
            CallbackAction::PromptMemory => {
                self.answer(cq, "").await;
                self.reply(&chat_id, "Send the new RAM threshold: /setram &lt;number&gt;")
                    .await;
            }
            CallbackAction::MainMenu => {
                self.answer(cq, "").await;
                self.show_settings(&chat_id, Some(message_id)).await;
            }
        }
    }

    async fn answer(&self, cq: &CallbackQuery, text: &str) {
        if let Err(e) = self.notifier.transport().answer_callback(&cq.id, text).await {
            warn!("Failed to answer callback: {}", e);
        }
    }

    async fn clear_buttons(&self, chat_id: &str, message_id: i64) {
        self.edit_markup(chat_id, message_id, &InlineKeyboard::empty())
            .await;
    }

    async fn refresh_settings(&self, chat_id: &str, message_id: i64) {
        let config = self.state.recipient_config(chat_id).await;
        self.edit_markup(chat_id, message_id, &messages::settings_keyboard(&config))
            .await;
    }

    async fn edit_markup(&self, chat_id: &str, message_id: i64, markup: &InlineKeyboard) {
        if let Err(e) = self
            .notifier
            .transport()
            .edit_reply_markup(chat_id, message_id, markup)
            .await
        {
            warn!(chat_id, message_id, "Failed to edit reply markup: {}", e);
        }
    }
}
