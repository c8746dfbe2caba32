//! Shared daemon state: every mutable collection the loops touch

use crate::batcher::{Batch, PendingQueues};
use crate::collector::ProcessInfo;
use crate::db::{Store, IGNORED_KEY, RECIPIENTS_KEY, SETTINGS_KEY, STATS_KEY, WHITELIST_KEY};
use crate::filter::{self, NameSets};
use crate::recipient::RecipientConfig;
use crate::stats::{StatRecord, StatsLedger};
use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{error, info};

/// Owns the ignore/whitelist sets, recipients and their settings, the stats
/// ledger and the pending queues.
///
/// In-memory collections sit behind their own short-lived locks; those guards
/// never cross an `.await`. Every persistence write goes through the store
/// mutex, which the flush loop also holds for its whole pass.
pub struct StateManager {
    store: AsyncMutex<Store>,
    ignored: RwLock<HashSet<String>>,
    whitelist: RwLock<HashSet<String>>,
    recipients: RwLock<BTreeSet<String>>,
    settings: RwLock<HashMap<String, RecipientConfig>>,
    stats: RwLock<StatsLedger>,
    pending: Mutex<PendingQueues>,
    system: HashSet<String>,
    defaults: RecipientConfig,
}

impl StateManager {
    /// Restores persisted state. The ignore list starts as the system list
    /// when nothing has been stored yet.
    pub fn load(store: Store, defaults: RecipientConfig, system_processes: &[String]) -> Self {
        let ignored: HashSet<String> = store.load(IGNORED_KEY, system_processes.to_vec()).into_iter().collect();
        let whitelist: HashSet<String> = store.load(WHITELIST_KEY, Vec::<String>::new()).into_iter().collect();
        let recipients: BTreeSet<String> = store.load(RECIPIENTS_KEY, Vec::<String>::new()).into_iter().collect();
        let mut settings: HashMap<String, RecipientConfig> = store.load(SETTINGS_KEY, HashMap::new());
        for id in &recipients {
            settings.entry(id.clone()).or_insert_with(|| defaults.clone());
        }
        let mut stats: StatsLedger = store.load(STATS_KEY, StatsLedger::new());
        stats.enforce_limit();

        info!(
            recipients = recipients.len(),
            ignored = ignored.len(),
            whitelisted = whitelist.len(),
            "State restored"
        );

        Self {
            store: AsyncMutex::new(store),
            ignored: RwLock::new(ignored),
            whitelist: RwLock::new(whitelist),
            recipients: RwLock::new(recipients),
            settings: RwLock::new(settings),
            stats: RwLock::new(stats),
            pending: Mutex::new(PendingQueues::new()),
            system: system_processes.iter().cloned().collect(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &RecipientConfig {
        &self.defaults
    }

    // ---- persistence ----

    /// Takes the persistence write lock.
    pub async fn lock_persistence(&self) -> MutexGuard<'_, Store> {
        self.store.lock().await
    }

    async fn save_doc<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let store = self.store.lock().await;
        if let Err(e) = store.save(key, value) {
            error!(key, "Failed to save document: {}", e);
        }
    }

    pub async fn save_ignored(&self) {
        let names = self.ignored_names();
        self.save_doc(IGNORED_KEY, &names).await;
    }

    pub async fn save_whitelist(&self) {
        let names = self.whitelisted_names();
        self.save_doc(WHITELIST_KEY, &names).await;
    }

    pub async fn save_recipients(&self) {
        let ids = self.active_recipients();
        self.save_doc(RECIPIENTS_KEY, &ids).await;
    }

    pub async fn save_settings(&self) {
        let settings: BTreeMap<String, RecipientConfig> = self
            .settings
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.save_doc(SETTINGS_KEY, &settings).await;
    }

    pub async fn save_stats(&self) {
        let stats = self.stats.read().clone();
        self.save_doc(STATS_KEY, &stats).await;
    }

    pub async fn save_all(&self) {
        self.save_ignored().await;
        self.save_whitelist().await;
        self.save_recipients().await;
        self.save_settings().await;
        self.save_stats().await;
    }

    // ---- recipients ----

    pub fn active_recipients(&self) -> Vec<String> {
        self.recipients.read().iter().cloned().collect()
    }

    pub fn is_active(&self, recipient: &str) -> bool {
        self.recipients.read().contains(recipient)
    }

    /// Subscribes a recipient with a fresh default config. Returns `false` if
    /// it was already active.
    pub async fn activate(&self, recipient: &str) -> bool {
        if !self.recipients.write().insert(recipient.to_string()) {
            return false;
        }
        self.settings
            .write()
            .insert(recipient.to_string(), self.defaults.clone());
        self.save_recipients().await;
        self.save_settings().await;
        true
    }

    /// Unsubscribes a recipient and drops its pending alerts. Settings are kept.
    pub async fn deactivate(&self, recipient: &str) -> bool {
        if !self.recipients.write().remove(recipient) {
            return false;
        }
        self.pending.lock().remove(recipient);
        self.save_recipients().await;
        true
    }

    /// Config without creating one.
    pub fn peek_config(&self, recipient: &str) -> Option<RecipientConfig> {
        self.settings.read().get(recipient).cloned()
    }

    /// Config for a recipient, created from defaults (and persisted) on first access.
    pub async fn recipient_config(&self, recipient: &str) -> RecipientConfig {
        if let Some(config) = self.peek_config(recipient) {
            return config;
        }
        let config = self
            .settings
            .write()
            .entry(recipient.to_string())
            .or_insert_with(|| self.defaults.clone())
            .clone();
        self.save_settings().await;
        config
    }

    /// Applies `f` to the recipient's config and persists the result.
    pub async fn update_config<R>(
        &self,
        recipient: &str,
        f: impl FnOnce(&mut RecipientConfig) -> R,
    ) -> R {
        let result = {
            let mut settings = self.settings.write();
            let config = settings
                .entry(recipient.to_string())
                .or_insert_with(|| self.defaults.clone());
            f(config)
        };
        self.save_settings().await;
        result
    }

    // ---- name lists ----

    pub fn ignored_names(&self) -> Vec<String> {
        sorted(&self.ignored.read())
    }

    pub fn whitelisted_names(&self) -> Vec<String> {
        sorted(&self.whitelist.read())
    }

    pub async fn ignore(&self, name: &str) -> bool {
        let added = self.ignored.write().insert(name.to_string());
        if added {
            self.save_ignored().await;
        }
        added
    }

    pub async fn unignore(&self, name: &str) -> bool {
        let removed = self.ignored.write().remove(name);
        if removed {
            self.save_ignored().await;
        }
        removed
    }

    pub async fn allow(&self, name: &str) -> bool {
        let added = self.whitelist.write().insert(name.to_string());
        if added {
            self.save_whitelist().await;
        }
        added
    }

    pub async fn disallow(&self, name: &str) -> bool {
        let removed = self.whitelist.write().remove(name);
        if removed {
            self.save_whitelist().await;
        }
        removed
    }

    // ---- filtering ----

    pub fn should_notify(&self, process: &ProcessInfo, config: &RecipientConfig) -> bool {
        let ignored = self.ignored.read();
        let whitelist = self.whitelist.read();
        filter::should_notify(
            process,
            config,
            NameSets {
                ignored: &ignored,
                whitelist: &whitelist,
                system: &self.system,
            },
        )
    }

    // ---- stats ----

    pub fn record_stat(&self, process: &ProcessInfo, at: DateTime<Local>) {
        self.stats
            .write()
            .record(&process.name, StatRecord::from_process(process, at));
    }

    pub fn with_stats<R>(&self, f: impl FnOnce(&StatsLedger) -> R) -> R {
        f(&self.stats.read())
    }

    // ---- pending queues ----

    pub fn enqueue(&self, recipient: &str, process: ProcessInfo) {
        self.pending.lock().enqueue(recipient, process);
    }

    pub fn pending_len(&self, recipient: &str) -> usize {
        self.pending.lock().pending(recipient).len()
    }

    pub fn pending_recipients(&self) -> Vec<String> {
        self.pending.lock().recipients()
    }

    pub fn take_due(
        &self,
        recipient: &str,
        config: &RecipientConfig,
        now: DateTime<Local>,
    ) -> Option<Batch> {
        self.pending.lock().take_due(recipient, config, now)
    }
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = set.iter().cloned().collect();
    names.sort();
    names
}
