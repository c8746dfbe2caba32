//! Fakes shared by the integration tests

#![allow(dead_code)]

use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use procwatch_daemon::{
    collector::{ProcessCollector, ProcessInfo},
    db::Store,
    protocol::{InlineKeyboard, Update},
    recipient::RecipientConfig,
    state::StateManager,
    transport::{OutboundMessage, Transport, TransportError},
};
use std::collections::HashMap;
use std::path::PathBuf;

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 14, h, m, s).single().unwrap()
}

pub fn process(pid: u32, name: &str, cpu: f64, memory: f64) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        exe: Some(PathBuf::from(format!("/usr/bin/{name}"))),
        cmdline: Some(format!("/usr/bin/{name} --flag")),
        username: "alice".to_string(),
        created_at: at(12, 0, 0),
        status: "running".to_string(),
        cpu_percent: cpu,
        memory_mb: memory,
    }
}

pub fn state_with(defaults: RecipientConfig, system: &[&str]) -> StateManager {
    let store = Store::open_in_memory().unwrap();
    let system: Vec<String> = system.iter().map(|s| s.to_string()).collect();
    StateManager::load(store, defaults, &system)
}

/// Transport that records every call and never touches the network.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub markup_edits: Mutex<Vec<(String, i64, InlineKeyboard)>>,
    pub answers: Mutex<Vec<(String, String)>>,
    pub fail_sends: Mutex<bool>,
    next_id: Mutex<i64>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<i64, TransportError> {
        if *self.fail_sends.lock() {
            return Err(TransportError::Api("forced failure".to_string()));
        }
        self.sent.lock().push(message.clone());
        let mut id = self.next_id.lock();
        *id += 1;
        Ok(message.edit_message_id.unwrap_or(*id))
    }

    async fn edit_reply_markup(
        &self,
        chat_id: &str,
        message_id: i64,
        markup: &InlineKeyboard,
    ) -> Result<(), TransportError> {
        self.markup_edits
            .lock()
            .push((chat_id.to_string(), message_id, markup.clone()));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), TransportError> {
        self.answers
            .lock()
            .push((callback_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn poll(&self, _offset: i64) -> Result<Vec<Update>, TransportError> {
        Ok(Vec::new())
    }
}

/// Collector whose process table is set by the test.
#[derive(Default)]
pub struct ScriptedCollector {
    table: Mutex<HashMap<u32, Option<ProcessInfo>>>,
}

impl ScriptedCollector {
    /// `None` entries are listed but fail to describe.
    pub fn set(&self, entries: Vec<(u32, Option<ProcessInfo>)>) {
        *self.table.lock() = entries.into_iter().collect();
    }
}

impl ProcessCollector for ScriptedCollector {
    fn list_pids(&self) -> Vec<u32> {
        self.table.lock().keys().copied().collect()
    }

    fn get_process(&self, pid: u32) -> Option<ProcessInfo> {
        self.table.lock().get(&pid).cloned().flatten()
    }
}
