// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account manager: owns every messenger session of this process.
//!
//! Each account has exactly one session, one event pump and one entry in
//! the on-disk index. The map lock is only taken by add, remove and
//! lookups; connection flags live on the account itself.

pub mod index;
mod pump;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock as StdRwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use courier_core::{
    Clock, CourierError, MessageClass, MessageId, MessengerFactory, MessengerSession, PairingEvent,
};

use crate::inbound::InboundHandler;
use crate::rpc::with_deadline;
use crate::sender::{Pacing, Sender};

pub use index::{session_file_name, AccountIndex, IndexEntry, DEFAULT_ACCOUNT_ID};
pub use pump::SENDER_IDLE_TIMEOUT;

/// One messenger account.
pub struct Account {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    session: Arc<dyn MessengerSession>,
    connected: AtomicBool,
    logged_in: AtomicBool,
    phone: StdRwLock<Option<String>>,
    pairing: tokio::sync::Mutex<()>,
}

/// Serializable view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub is_connected: bool,
    pub is_logged_in: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
        session: Arc<dyn MessengerSession>,
    ) -> Self {
        let account = Self {
            id: id.into(),
            name: name.into(),
            created_at,
            session,
            connected: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            phone: StdRwLock::new(None),
            pairing: tokio::sync::Mutex::new(()),
        };
        account.refresh();
        account
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Arc<dyn MessengerSession> {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    pub fn phone(&self) -> Option<String> {
        self.phone.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub(crate) fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_logged_in(&self, value: bool) {
        self.logged_in.store(value, Ordering::SeqCst);
    }

    /// Re-reads the flags and phone number from the live session.
    pub fn refresh(&self) {
        self.set_connected(self.session.is_connected());
        self.set_logged_in(self.session.is_logged_in());
        if let Some(phone) = self.session.own_phone() {
            *self.phone.write().unwrap_or_else(|p| p.into_inner()) = Some(phone);
        }
    }

    pub fn info(&self) -> AccountInfo {
        AccountInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            phone: self.phone().unwrap_or_default(),
            is_connected: self.is_connected(),
            is_logged_in: self.is_logged_in(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}

/// Result of a pairing request.
pub enum Pairing {
    /// The account is already logged in; nothing to scan.
    AlreadyLoggedIn,
    /// A fresh pairing stream, exclusively owned by the caller.
    Stream(mpsc::Receiver<PairingEvent>),
}

struct Entry {
    account: Arc<Account>,
    pump: JoinHandle<()>,
}

/// Owns the account-id to account mapping.
pub struct AccountManager {
    accounts: RwLock<HashMap<String, Entry>>,
    factory: Arc<dyn MessengerFactory>,
    session_dir: PathBuf,
    index: AccountIndex,
    sender: Arc<Sender>,
    inbound: Arc<InboundHandler>,
    clock: Arc<dyn Clock>,
    rpc_timeout: Duration,
    pumps_stop: CancellationToken,
    index_lock: Mutex<()>,
}

impl AccountManager {
    pub fn new(
        factory: Arc<dyn MessengerFactory>,
        session_dir: impl Into<PathBuf>,
        sender: Arc<Sender>,
        inbound: Arc<InboundHandler>,
        clock: Arc<dyn Clock>,
        rpc_timeout: Duration,
    ) -> Self {
        let session_dir = session_dir.into();
        Self {
            accounts: RwLock::new(HashMap::new()),
            index: AccountIndex::new(&session_dir),
            factory,
            session_dir,
            sender,
            inbound,
            clock,
            rpc_timeout,
            pumps_stop: CancellationToken::new(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    async fn open_entry(
        &self,
        id: &str,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Entry, CourierError> {
        let store = self.session_dir.join(session_file_name(id));
        let opened = self.factory.open(&store).await?;
        let account = Arc::new(Account::new(id, name, created_at, opened.session));
        let pump = pump::spawn_pump(
            account.clone(),
            opened.events,
            self.inbound.clone(),
            self.pumps_stop.child_token(),
        );
        Ok(Entry { account, pump })
    }

    async fn persist(&self, map: &HashMap<String, Entry>) -> Result<(), CourierError> {
        let mut entries: Vec<IndexEntry> = map
            .values()
            .map(|e| IndexEntry {
                id: e.account.id.clone(),
                name: e.account.name.clone(),
                created_at: e.account.created_at,
            })
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        self.index.save(&entries).await
    }

    /// Restores every indexed account and, when the index is missing, a
    /// legacy `wa_session.db`. Returns the number of accounts restored.
    pub async fn restore(&self) -> Result<usize, CourierError> {
        let mut entries = self.index.load().await?;
        if entries.is_empty()
            && tokio::fs::try_exists(self.session_dir.join(session_file_name(DEFAULT_ACCOUNT_ID)))
                .await
                .unwrap_or(false)
        {
            info!("restoring legacy single-account session");
            entries.push(IndexEntry {
                id: DEFAULT_ACCOUNT_ID.to_string(),
                name: "Default".to_string(),
                created_at: self.clock.now_utc(),
            });
        }

        let mut map = self.accounts.write().await;
        for entry in &entries {
            if map.contains_key(&entry.id) {
                continue;
            }
            match self.open_entry(&entry.id, &entry.name, entry.created_at).await {
                Ok(opened) => {
                    map.insert(entry.id.clone(), opened);
                }
                Err(e) => error!(account_id = %entry.id, error = %e, "failed to restore account"),
            }
        }
        if !entries.is_empty() {
            self.persist(&map).await?;
        }
        info!(count = map.len(), "accounts restored");
        Ok(map.len())
    }

    /// Creates an account with a fresh session store. Does not connect.
    ///
    /// The write lock is held for the whole construction, so concurrent
    /// readers never observe a half-built account.
    pub async fn add(&self, name: &str) -> Result<AccountInfo, CourierError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CourierError::Validation("name is required".into()));
        }
        let mut map = self.accounts.write().await;
        let id = loop {
            let candidate = new_account_id();
            if !map.contains_key(&candidate) {
                break candidate;
            }
        };
        let entry = self.open_entry(&id, name, self.clock.now_utc()).await?;
        let info = entry.account.info();
        map.insert(id.clone(), entry);
        if let Err(e) = self.persist(&map).await {
            if let Some(entry) = map.remove(&id) {
                entry.pump.abort();
            }
            return Err(e);
        }
        info!(account_id = %id, name = %name, "account added");
        Ok(info)
    }

    /// Returns the legacy `default` account, creating it if needed.
    pub async fn ensure_default(&self) -> Result<Arc<Account>, CourierError> {
        if let Some(account) = self.get(DEFAULT_ACCOUNT_ID).await {
            return Ok(account);
        }
        let mut map = self.accounts.write().await;
        if let Some(entry) = map.get(DEFAULT_ACCOUNT_ID) {
            return Ok(entry.account.clone());
        }
        let entry = self
            .open_entry(DEFAULT_ACCOUNT_ID, "Default", self.clock.now_utc())
            .await?;
        let account = entry.account.clone();
        map.insert(DEFAULT_ACCOUNT_ID.to_string(), entry);
        if let Err(e) = self.persist(&map).await {
            if let Some(entry) = map.remove(DEFAULT_ACCOUNT_ID) {
                entry.pump.abort();
            }
            return Err(e);
        }
        info!("legacy default account created");
        Ok(account)
    }

    /// Disconnects and forgets an account, deleting its session store.
    pub async fn remove(&self, id: &str) -> Result<(), CourierError> {
        let mut map = self.accounts.write().await;
        let entry = map
            .remove(id)
            .ok_or_else(|| CourierError::not_found("account", id))?;
        if entry.account.session.is_connected() {
            self.disconnect_session(&entry.account).await;
        }
        entry.pump.abort();
        // The account is already gone; a stale index only resurrects it on restart.
        if let Err(e) = self.persist(&map).await {
            warn!(account_id = %id, error = %e, "failed to update account index after removal");
        }
        drop(map);

        let store = self.session_dir.join(session_file_name(id));
        match tokio::fs::remove_file(&store).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                warn!(account_id = %id, error = %e, "failed to delete session store");
            }
            _ => {}
        }
        info!(account_id = %id, "account removed");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Account>> {
        self.accounts
            .read()
            .await
            .get(id)
            .map(|e| e.account.clone())
    }

    async fn require(&self, id: &str) -> Result<Arc<Account>, CourierError> {
        self.get(id)
            .await
            .ok_or_else(|| CourierError::not_found("account", id))
    }

    /// Accounts ordered by creation time.
    async fn accounts(&self) -> Vec<Arc<Account>> {
        let mut accounts: Vec<Arc<Account>> = self
            .accounts
            .read()
            .await
            .values()
            .map(|e| e.account.clone())
            .collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        accounts
    }

    /// Lists every account after refreshing its flags from the live session.
    pub async fn list(&self) -> Vec<AccountInfo> {
        self.accounts()
            .await
            .iter()
            .map(|a| {
                a.refresh();
                a.info()
            })
            .collect()
    }

    /// Fresh status of one account.
    pub async fn status(&self, id: &str) -> Result<AccountInfo, CourierError> {
        let account = self.require(id).await?;
        account.refresh();
        Ok(account.info())
    }

    pub async fn connect(&self, id: &str) -> Result<AccountInfo, CourierError> {
        let account = self.require(id).await?;
        if !account.session.is_connected() {
            with_deadline(self.rpc_timeout, account.session.connect()).await?;
        }
        account.refresh();
        info!(account_id = %id, "account connect requested");
        Ok(account.info())
    }

    pub async fn disconnect(&self, id: &str) -> Result<AccountInfo, CourierError> {
        let account = self.require(id).await?;
        self.disconnect_session(&account).await;
        account.refresh();
        Ok(account.info())
    }

    async fn disconnect_session(&self, account: &Account) {
        if tokio::time::timeout(self.rpc_timeout, account.session.disconnect())
            .await
            .is_err()
        {
            warn!(account_id = %account.id, "disconnect timed out");
        }
    }

    /// Connects every account whose session holds a device identity.
    pub async fn connect_all(&self) -> usize {
        let mut connected = 0;
        for account in self.accounts().await {
            if !account.session.has_device_identity() || account.session.is_connected() {
                continue;
            }
            match with_deadline(self.rpc_timeout, account.session.connect()).await {
                Ok(()) => {
                    connected += 1;
                    account.refresh();
                    info!(account_id = %account.id, "account reconnected");
                }
                Err(e) => error!(account_id = %account.id, error = %e, "failed to connect account"),
            }
        }
        connected
    }

    pub async fn disconnect_all(&self) {
        for account in self.accounts().await {
            if account.session.is_connected() {
                self.disconnect_session(&account).await;
                account.refresh();
            }
        }
    }

    /// Starts pairing for an account.
    ///
    /// The session is disconnected first, the pairing stream requested, and
    /// only then reconnected, because the messenger only emits pairing
    /// events on a fresh connection.
    pub async fn pairing(&self, id: &str) -> Result<Pairing, CourierError> {
        let account = self.require(id).await?;
        let _guard = account.pairing.lock().await;
        if account.session.is_logged_in() {
            return Ok(Pairing::AlreadyLoggedIn);
        }
        if account.session.is_connected() {
            self.disconnect_session(&account).await;
        }
        let rx = with_deadline(self.rpc_timeout, account.session.pairing_channel()).await?;
        with_deadline(self.rpc_timeout, account.session.connect()).await?;
        account.refresh();
        info!(account_id = %id, "pairing started");
        Ok(Pairing::Stream(rx))
    }

    /// Sends from a specific account through the send path.
    pub async fn send_message_from(
        &self,
        account_id: &str,
        phone: &str,
        text: &str,
        class: &MessageClass,
        pacing: Pacing,
    ) -> Result<MessageId, CourierError> {
        let account = self.require(account_id).await?;
        self.send_from(&account, phone, text, class, pacing).await
    }

    pub async fn send_from(
        &self,
        account: &Account,
        phone: &str,
        text: &str,
        class: &MessageClass,
        pacing: Pacing,
    ) -> Result<MessageId, CourierError> {
        self.sender.send(account, phone, text, class, pacing).await
    }

    /// The earliest-created connected account.
    pub async fn first_connected(&self) -> Option<Arc<Account>> {
        self.accounts()
            .await
            .into_iter()
            .find(|a| a.session.is_connected())
    }

    /// Resolves the sending account: the given id, or the first connected one.
    pub async fn route(&self, account_id: Option<&str>) -> Result<Arc<Account>, CourierError> {
        match account_id.filter(|id| !id.is_empty()) {
            Some(id) => self.require(id).await,
            None => self
                .first_connected()
                .await
                .ok_or_else(|| CourierError::Unavailable("No connected account available".into())),
        }
    }

    pub async fn any_connected(&self) -> bool {
        self.accounts().await.iter().any(|a| a.session.is_connected())
    }

    pub async fn any_logged_in(&self) -> bool {
        self.accounts().await.iter().any(|a| a.session.is_logged_in())
    }

    /// Stops every event pump and disconnects every session.
    pub async fn shutdown(&self) {
        self.disconnect_all().await;
        self.pumps_stop.cancel();
        let map = self.accounts.read().await;
        for entry in map.values() {
            entry.pump.abort();
        }
        info!(count = map.len(), "accounts disconnected");
    }
}

/// Short opaque account id: the first 8 hex chars of a v4 UUID.
pub fn new_account_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use courier_config::model::{BotConfig, PolicyConfig};
    use courier_core::MockClock;
    use courier_test_utils::{MemoryRepository, MockFactory};

    use super::index::INDEX_FILE;
    use crate::settings::Settings;
    use crate::tables::KeywordTable;

    struct Fixture {
        manager: Arc<AccountManager>,
        factory: Arc<MockFactory>,
        _dir: tempfile::TempDir,
    }

    fn fixture_in(dir: tempfile::TempDir, factory: Arc<MockFactory>) -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new(
            DateTime::parse_from_rfc3339("2026-03-02T10:00:00+07:00").unwrap(),
        ));
        let settings = Arc::new(Settings::from_config(
            &PolicyConfig::default(),
            &BotConfig::default(),
            clock.clone(),
        ));
        let sender = Arc::new(Sender::new(
            settings.clone(),
            CancellationToken::new(),
            Duration::from_secs(5),
        ));
        let repo = Arc::new(MemoryRepository::new(clock.clone()));
        let inbound = Arc::new(InboundHandler::new(
            repo,
            settings,
            Arc::new(KeywordTable::default()),
            sender.clone(),
            Duration::from_secs(5),
        ));
        let manager = Arc::new(AccountManager::new(
            factory.clone(),
            dir.path(),
            sender,
            inbound,
            clock,
            Duration::from_secs(5),
        ));
        Fixture {
            manager,
            factory,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_in(tempfile::tempdir().unwrap(), Arc::new(MockFactory::new()))
    }

    #[test]
    fn account_ids_are_short_hex() {
        let id = new_account_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn add_opens_keyed_store_without_connecting() {
        let f = fixture();
        let info = f.manager.add("Sales").await.unwrap();
        assert_eq!(info.name, "Sales");
        assert!(!info.is_connected);

        let file = session_file_name(&info.id);
        let session = f.factory.session(&file).expect("store opened");
        assert!(session.calls().is_empty());

        let index = AccountIndex::new(f.manager.session_dir()).load().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].id, info.id);
    }

    #[tokio::test]
    async fn add_rejects_blank_name() {
        let f = fixture();
        assert!(matches!(
            f.manager.add("  ").await,
            Err(CourierError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn remove_disconnects_then_forgets() {
        let f = fixture();
        let info = f.manager.add("Sales").await.unwrap();
        f.manager.connect(&info.id).await.unwrap();
        let session = f.factory.session(&session_file_name(&info.id)).unwrap();

        f.manager.remove(&info.id).await.unwrap();
        assert_eq!(session.calls(), vec!["connect", "disconnect"]);
        assert!(f.manager.get(&info.id).await.is_none());
        assert!(matches!(
            f.manager.remove(&info.id).await,
            Err(CourierError::NotFound { kind: "account", .. })
        ));
        assert!(AccountIndex::new(f.manager.session_dir())
            .load()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn restore_reconnects_only_paired_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let index = AccountIndex::new(dir.path());
        let now = Utc::now();
        index
            .save(&[
                IndexEntry {
                    id: "aaaa1111".into(),
                    name: "Paired".into(),
                    created_at: now,
                },
                IndexEntry {
                    id: "bbbb2222".into(),
                    name: "Fresh".into(),
                    created_at: now,
                },
            ])
            .await
            .unwrap();

        let factory = Arc::new(MockFactory::new());
        factory.pre_pair("wa_session_aaaa1111.db", "628100");
        let f = fixture_in(dir, factory);

        assert_eq!(f.manager.restore().await.unwrap(), 2);
        assert_eq!(f.manager.connect_all().await, 1);

        let list = f.manager.list().await;
        let paired = list.iter().find(|a| a.id == "aaaa1111").unwrap();
        assert!(paired.is_connected && paired.is_logged_in);
        assert_eq!(paired.phone, "628100");
        let fresh = list.iter().find(|a| a.id == "bbbb2222").unwrap();
        assert!(!fresh.is_connected);
    }

    #[tokio::test]
    async fn restore_picks_up_legacy_session() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wa_session.db"), b"").unwrap();
        let f = fixture_in(dir, Arc::new(MockFactory::new()));
        assert_eq!(f.manager.restore().await.unwrap(), 1);
        assert!(f.manager.get(DEFAULT_ACCOUNT_ID).await.is_some());
    }

    #[tokio::test]
    async fn pairing_disconnects_requests_stream_then_reconnects() {
        let f = fixture();
        let info = f.manager.add("Sales").await.unwrap();
        f.manager.connect(&info.id).await.unwrap();
        let session = f.factory.session(&session_file_name(&info.id)).unwrap();

        let Pairing::Stream(mut rx) = f.manager.pairing(&info.id).await.unwrap() else {
            panic!("expected a pairing stream");
        };
        assert_eq!(
            session.calls(),
            vec!["connect", "disconnect", "pairing_channel", "connect"]
        );
        assert_eq!(rx.recv().await, Some(PairingEvent::Code("code-1".into())));
        assert_eq!(rx.recv().await, Some(PairingEvent::Success));

        assert!(matches!(
            f.manager.pairing(&info.id).await.unwrap(),
            Pairing::AlreadyLoggedIn
        ));
    }

    #[tokio::test]
    async fn route_prefers_explicit_account_then_first_connected() {
        let f = fixture();
        assert!(matches!(
            f.manager.route(None).await,
            Err(CourierError::Unavailable(_))
        ));
        let a = f.manager.add("A").await.unwrap();
        let b = f.manager.add("B").await.unwrap();
        f.manager.connect(&b.id).await.unwrap();

        assert_eq!(f.manager.route(None).await.unwrap().id(), b.id);
        assert_eq!(f.manager.route(Some(&a.id)).await.unwrap().id(), a.id);
        assert!(matches!(
            f.manager.route(Some("missing")).await,
            Err(CourierError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn send_from_unknown_account_is_not_found() {
        let f = fixture();
        let err = f
            .manager
            .send_message_from("nope", "+62", "hi", &MessageClass::Manual, Pacing::Immediate)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NotFound { kind: "account", .. }));
    }

    #[tokio::test]
    async fn concurrent_add_and_list_see_whole_accounts() {
        let f = fixture();
        let mut tasks = Vec::new();
        for i in 0..8 {
            let manager = f.manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.add(&format!("acc-{i}")).await.unwrap();
                manager.list().await
            }));
        }
        for task in tasks {
            for info in task.await.unwrap() {
                assert!(info.name.starts_with("acc-"));
                assert_eq!(info.id.len(), 8);
            }
        }
        assert_eq!(f.manager.list().await.len(), 8);
    }

    #[tokio::test]
    async fn add_rolls_back_when_the_index_cannot_be_written() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(INDEX_FILE).join("blocker")).unwrap();
        let f = fixture_in(dir, Arc::new(MockFactory::new()));

        assert!(matches!(f.manager.add("Sales").await, Err(CourierError::Storage { .. })));
        assert!(f.manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn remove_succeeds_when_the_index_cannot_be_written() {
        let f = fixture();
        let info = f.manager.add("Sales").await.unwrap();
        let index_path = f.manager.session_dir().join(INDEX_FILE);
        std::fs::remove_file(&index_path).unwrap();
        std::fs::create_dir_all(index_path.join("blocker")).unwrap();

        f.manager.remove(&info.id).await.unwrap();
        assert!(f.manager.get(&info.id).await.is_none());
    }

}
