//! Message text and inline keyboards (HTML parse mode)

use crate::batcher::GROUP_LIST_LIMIT;
use crate::collector::ProcessInfo;
use crate::protocol::{InlineButton, InlineKeyboard};
use crate::recipient::{FilterMode, RecipientConfig};
use crate::stats::ProcessStats;

const CMDLINE_PREVIEW: usize = 500;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn format_single(info: &ProcessInfo) -> String {
    let exe = info
        .exe
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let cmdline = info.cmdline.as_deref().unwrap_or("N/A");
    format!(
        "🔔 <b>New process</b>\n\
         📋 <b>Name:</b> {}\n\
         🆔 <b>PID:</b> {}\n\
         👤 <b>User:</b> {}\n\
         📅 <b>Started:</b> {}\n\
         📊 <b>Status:</b> {}\n\
         💾 <b>Memory:</b> {} MB\n\
         ⚙️ <b>CPU:</b> {:.1}%\n\
         📂 <b>Executable:</b> <code>{}</code>\n\
         🖥 <b>Command:</b> <code>{}</code>",
        escape_html(&info.name),
        info.pid,
        escape_html(&info.username),
        info.created_at.format(TIME_FORMAT),
        info.status,
        info.memory_mb,
        info.cpu_percent,
        escape_html(&exe),
        escape_html(truncate_chars(cmdline, CMDLINE_PREVIEW)),
    )
}

pub fn format_grouped(processes: &[ProcessInfo]) -> String {
    let count = processes.len();
    let mut message = format!("🔔 <b>New processes detected: {count}</b>\n\n");
    for info in processes.iter().take(GROUP_LIST_LIMIT) {
        message.push_str(&format!(
            "• <b>{}</b> (PID: {}, CPU: {:.1}%, RAM: {}MB)\n 👤 {} | 📅 {}\n\n",
            escape_html(&info.name),
            info.pid,
            info.cpu_percent,
            info.memory_mb,
            escape_html(&info.username),
            info.created_at.format(TIME_FORMAT),
        ));
    }
    if count > GROUP_LIST_LIMIT {
        message.push_str(&format!(
            "\n<i>... and {} more</i>",
            count - GROUP_LIST_LIMIT
        ));
    }
    message
}

/// The ignore / whitelist action pair attached to single alerts.
pub fn process_keyboard(name: &str) -> InlineKeyboard {
    InlineKeyboard::empty().row(vec![
        InlineButton::new("❌ Ignore", format!("ignore_{name}")),
        InlineButton::new("⭐ Whitelist", format!("whitelist_{name}")),
    ])
}

fn check(on: bool) -> &'static str {
    if on {
        "✅"
    } else {
        "❌"
    }
}

fn mode_icon(mode: &FilterMode) -> &'static str {
    match mode {
        FilterMode::Blacklist | FilterMode::Unknown(_) => "🚫",
        FilterMode::Whitelist => "⭐",
        FilterMode::Smart => "🧠",
    }
}

pub fn settings_keyboard(config: &RecipientConfig) -> InlineKeyboard {
    let quiet = format!(
        "{} Quiet hours ({}-{})",
        check(config.quiet_hours_enabled),
        config.quiet_hours_start.format("%H:%M"),
        config.quiet_hours_end.format("%H:%M"),
    );
    InlineKeyboard::empty()
        .row(vec![InlineButton::new(
            format!("{} Mode: {}", mode_icon(&config.mode), config.mode),
            "set_mode",
        )])
        .row(vec![InlineButton::new(
            format!(
                "{} Group notifications ({}s)",
                check(config.batching),
                config.batch_window_secs
            ),
            "toggle_group",
        )])
        .row(vec![InlineButton::new(quiet, "set_quiet")])
        .row(vec![InlineButton::new(
            format!("{} Ignore system processes", check(config.ignore_system)),
            "toggle_system",
        )])
        .row(vec![InlineButton::new(
            format!("⚙️ CPU threshold: {}%", config.min_cpu_percent),
            "set_cpu",
        )])
        .row(vec![InlineButton::new(
            format!("💾 RAM threshold: {}MB", config.min_memory_mb),
            "set_memory",
        )])
        .row(vec![InlineButton::new(
            format!("{} Statistics", check(config.track_stats)),
            "toggle_stats",
        )])
        .row(vec![InlineButton::new(
            format!("{} Reuse settings message", check(config.update_single_message)),
            "toggle_single",
        )])
        .row(vec![InlineButton::new("🔙 Back", "main_menu")])
}

pub const SETTINGS_TITLE: &str = "⚙️ <b>Settings</b>";

pub const WELCOME: &str = "✅ <b>Welcome to procwatch!</b>\n\n\
    🔔 Notifications are on\n\
    ⚙️ /settings to configure\n\n\
    📚 <b>Commands:</b>\n\
    /settings /list /whitelist /stats /help";

pub const GOODBYE: &str = "👋 Notifications are off. Send /start to turn them back on";

pub const NOT_ACTIVE: &str = "⚠️ Send /start to activate";

pub const UNKNOWN_COMMAND: &str = "❓ Unknown command. /help";

pub const HELP: &str = "📚 <b>Help</b>\n\
    Basics: /start /stop /settings /help\n\
    Lists: /list /whitelist\n\
    Edit lists: /ignore &lt;name&gt; /unignore &lt;name&gt; /allow &lt;name&gt; /disallow &lt;name&gt;\n\
    Statistics: /stats /history &lt;process&gt;\n\
    Quiet hours: /quiet 22:00-08:00 or /quiet off\n\
    Thresholds: /setcpu &lt;percent&gt; /setram &lt;MB&gt;\n\
    Grouping window: /setgroup &lt;seconds&gt;\n\
    Modes: 🚫 blacklist ⭐ whitelist 🧠 smart";

pub fn format_name_list(title: &str, names: &[String]) -> String {
    if names.is_empty() {
        return format!("{title}: <i>empty</i>");
    }
    let body: Vec<String> = names.iter().map(|n| escape_html(n)).collect();
    format!("{title}:\n{}", body.join("\n"))
}

pub fn format_history(name: &str, stats: Option<&ProcessStats>) -> String {
    match stats {
        None => format!("📈 No records for <b>{}</b>", escape_html(name)),
        Some(s) => format!(
            "📈 <b>{}</b>: {} records\n\
             First seen: {}\n\
             Last seen: {}\n\
             CPU avg {:.1}% / p95 {:.1}%\n\
             RAM avg {:.1}MB / p95 {:.1}MB",
            escape_html(name),
            s.sample_count,
            s.first_seen.format(TIME_FORMAT),
            s.last_seen.format(TIME_FORMAT),
            s.cpu_avg,
            s.cpu_p95,
            s.memory_avg,
            s.memory_p95,
        ),
    }
}

pub fn format_top(top: &[(&str, usize)]) -> String {
    if top.is_empty() {
        return "📊 No statistics recorded yet".to_string();
    }
    let mut message = String::from("📊 <b>Most frequent new processes</b>\n");
    for (name, count) in top {
        message.push_str(&format!("• {}: {}\n", escape_html(name), count));
    }
    message
}
