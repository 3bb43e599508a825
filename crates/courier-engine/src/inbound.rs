// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound text handling: record the message, then maybe answer it.
//!
//! Replies go straight to the send path. A user who just wrote to us may
//! always be answered unless blocked, so the policy gate is not consulted.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use courier_core::{
    CourierError, InboundText, MessageClass, MessageId, NewMessage, NewUser, Repository, User,
    UserUpdate,
};

use crate::accounts::Account;
use crate::rpc::with_deadline;
use crate::sender::{Pacing, Sender};
use crate::settings::Settings;
use crate::tables::{normalize_keyword, KeywordTable};

/// Handles text messages received by any account.
pub struct InboundHandler {
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
    keywords: Arc<KeywordTable>,
    sender: Arc<Sender>,
    rpc_timeout: Duration,
}

impl InboundHandler {
    pub fn new(
        repo: Arc<dyn Repository>,
        settings: Arc<Settings>,
        keywords: Arc<KeywordTable>,
        sender: Arc<Sender>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            settings,
            keywords,
            sender,
            rpc_timeout,
        }
    }

    /// Processes one inbound message. Failures are logged, never returned.
    pub async fn handle(&self, account: &Account, message: InboundText) {
        let Some(text) = message.text() else {
            debug!(account_id = %account.id(), "ignoring non-text message");
            return;
        };
        let phone = message.sender.as_str();
        info!(account_id = %account.id(), phone = %phone, "inbound message");

        let user = match self.find_or_create(account.id(), phone).await {
            Ok(user) => user,
            Err(e) => {
                error!(account_id = %account.id(), phone = %phone, error = %e, "failed to create user");
                return;
            }
        };

        if let Err(e) = self
            .rpc(self.repo.update_user(&user.id, &UserUpdate::touch_last_user_message()))
            .await
        {
            warn!(user_id = %user.id, error = %e, "failed to stamp last user message");
        }

        let mut entry = NewMessage::incoming(&user.id, account.id(), text);
        entry.wa_message_id = Some(message.id.0.clone());
        self.log(entry).await;

        if !self.settings.auto_reply_enabled() {
            debug!(account_id = %account.id(), "auto-reply disabled");
            return;
        }

        if self.settings.should_send_away() {
            let away = self.settings.away_message();
            info!(account_id = %account.id(), phone = %phone, "outside operating hours, sending away message");
            if let Some(id) = self.reply(account, phone, &away, MessageClass::Away).await {
                self.log_outgoing(&user, account, MessageClass::Away, &away, &id).await;
            }
            return;
        }

        let key = normalize_keyword(text);
        let opt_in = match key.as_str() {
            "stop" => Some(false),
            "start" => Some(true),
            _ => None,
        };
        if let Some(opt_in) = opt_in {
            match self.rpc(self.repo.update_user(&user.id, &UserUpdate::opt_in(opt_in))).await {
                Ok(()) => info!(user_id = %user.id, opt_in, "opt-in changed by keyword"),
                Err(e) => warn!(user_id = %user.id, error = %e, "failed to update opt-in"),
            }
        }

        if let Some(response) = self.keywords.lookup(&key)
            && let Some(id) = self.reply(account, phone, &response, MessageClass::Reply).await
        {
            self.log_outgoing(&user, account, MessageClass::Reply, &response, &id).await;
        }
    }

    async fn find_or_create(&self, account_id: &str, phone: &str) -> Result<User, CourierError> {
        match self
            .rpc(self.repo.find_user_by_phone_and_account(phone, account_id))
            .await
        {
            Ok(Some(user)) => return Ok(user),
            Ok(None) => {}
            // A failed lookup falls through to creation; the unique key
            // rejects a duplicate if the row did exist.
            Err(e) => warn!(phone = %phone, error = %e, "user lookup failed"),
        }
        let user = self
            .rpc(self.repo.create_user(&NewUser {
                phone: phone.to_string(),
                account_id: Some(account_id.to_string()),
                name: None,
            }))
            .await?;
        info!(user_id = %user.id, account_id = %account_id, "user created");
        Ok(user)
    }

    async fn reply(
        &self,
        account: &Account,
        phone: &str,
        text: &str,
        class: MessageClass,
    ) -> Option<MessageId> {
        match self
            .sender
            .send(account, phone, text, &class, Pacing::Jitter)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(account_id = %account.id(), phone = %phone, class = %class, error = %e, "auto-reply failed");
                None
            }
        }
    }

    async fn log_outgoing(
        &self,
        user: &User,
        account: &Account,
        class: MessageClass,
        text: &str,
        id: &MessageId,
    ) {
        self.log(NewMessage::outgoing(&user.id, Some(account.id()), class, text, Some(id)))
            .await;
    }

    async fn log(&self, entry: NewMessage) {
        if let Err(e) = self.rpc(self.repo.append_message(&entry)).await {
            warn!(user_id = %entry.user_id, class = %entry.class, error = %e, "failed to log message");
        }
    }

    async fn rpc<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, CourierError>>,
    ) -> Result<T, CourierError> {
        with_deadline(self.rpc_timeout, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use courier_config::model::{BotConfig, PolicyConfig};
    use courier_core::{Clock, Direction, MessengerSession, MockClock};
    use courier_test_utils::{MemoryRepository, MockMessenger};
    use tokio_util::sync::CancellationToken;

    // 2026-03-02 is a Monday.
    const MONDAY_10AM: &str = "2026-03-02T10:00:00+07:00";
    const MONDAY_10PM: &str = "2026-03-02T22:00:00+07:00";

    struct Fixture {
        handler: InboundHandler,
        settings: Arc<Settings>,
        repo: Arc<MemoryRepository>,
        account: Account,
        session: Arc<MockMessenger>,
    }

    async fn fixture(at: &str) -> Fixture {
        let clock: Arc<dyn Clock> =
            Arc::new(MockClock::new(DateTime::parse_from_rfc3339(at).unwrap()));
        let settings = Arc::new(Settings::from_config(
            &PolicyConfig::default(),
            &BotConfig::default(),
            clock.clone(),
        ));
        let repo = Arc::new(MemoryRepository::new(clock));
        let keywords = Arc::new(KeywordTable::new([("jadwal", "J")]));
        let sender = Arc::new(Sender::new(
            settings.clone(),
            CancellationToken::new(),
            Duration::from_secs(30),
        ));
        let (session, _events) = MockMessenger::new();
        session.connect().await.unwrap();
        let account = Account::new("acc1", "Main", Utc::now(), session.clone());
        let handler = InboundHandler::new(
            repo.clone(),
            settings.clone(),
            keywords,
            sender,
            Duration::from_secs(30),
        );
        Fixture {
            handler,
            settings,
            repo,
            account,
            session,
        }
    }

    fn text(sender: &str, body: &str) -> InboundText {
        InboundText {
            id: MessageId("in-1".into()),
            sender: sender.into(),
            conversation: Some(body.into()),
            extended_text: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keyword_reply_is_sent_and_logged() {
        let f = fixture(MONDAY_10AM).await;
        f.handler.handle(&f.account, text("+6281", " Jadwal ")).await;

        let users = f.repo.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].phone, "+6281");
        assert_eq!(users[0].account_id.as_deref(), Some("acc1"));
        assert!(users[0].last_user_message_at.is_some());

        assert_eq!(f.session.sent_texts(), vec!["J"]);

        let log = f.repo.messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].direction, Direction::Incoming);
        assert_eq!(log[0].class, MessageClass::User);
        assert_eq!(log[0].content, " Jadwal ");
        assert_eq!(log[0].wa_message_id.as_deref(), Some("in-1"));
        assert_eq!(log[1].direction, Direction::Outgoing);
        assert_eq!(log[1].class, MessageClass::Reply);
        assert_eq!(log[1].content, "J");
        assert_eq!(log[1].account_id.as_deref(), Some("acc1"));
    }

    #[tokio::test(start_paused = true)]
    async fn away_message_replaces_keyword_dispatch() {
        let f = fixture(MONDAY_10PM).await;
        f.settings.set_away_enabled(true);
        f.settings.set_away_message("closed");

        f.handler.handle(&f.account, text("+6281", "stop")).await;

        assert_eq!(f.session.sent_texts(), vec!["closed"]);
        let log = f.repo.messages();
        assert_eq!(log.last().unwrap().class, MessageClass::Away);
        assert!(f.repo.users()[0].opt_in, "opt-in untouched outside hours");
    }

    #[tokio::test(start_paused = true)]
    async fn auto_reply_disabled_still_records() {
        let f = fixture(MONDAY_10AM).await;
        f.settings.set_auto_reply_enabled(false);
        f.handler.handle(&f.account, text("+6281", "jadwal")).await;

        assert!(f.session.sent().is_empty());
        assert_eq!(f.repo.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_start_toggle_opt_in() {
        let f = fixture(MONDAY_10AM).await;
        f.handler.handle(&f.account, text("+6281", "STOP")).await;
        assert!(!f.repo.users()[0].opt_in);

        f.handler.handle(&f.account, text("+6281", " start")).await;
        assert!(f.repo.users()[0].opt_in);
        assert_eq!(f.repo.users().len(), 1, "second message reuses the user");
        assert!(f.session.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn non_text_is_ignored() {
        let f = fixture(MONDAY_10AM).await;
        let mut message = text("+6281", "");
        message.conversation = None;
        f.handler.handle(&f.account, message).await;
        assert!(f.repo.users().is_empty());
        assert!(f.repo.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookup_falls_through_to_create() {
        let f = fixture(MONDAY_10AM).await;
        f.repo.fail_next("connection reset");
        f.handler.handle(&f.account, text("+6281", "jadwal")).await;
        assert_eq!(f.repo.users().len(), 1);
        assert_eq!(f.session.sent_texts(), vec!["J"]);
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn create_failure_aborts_without_logging() {
        let f = fixture(MONDAY_10AM).await;
        f.repo
            .create_user(&NewUser {
                phone: "+6281".into(),
                account_id: Some("acc1".into()),
                name: None,
            })
            .await
            .unwrap();
        // Lookup fails, so creation runs into the unique key.
        f.repo.fail_next("connection reset");
        f.handler.handle(&f.account, text("+6281", "jadwal")).await;

        assert!(logs_contain("failed to create user"));
        assert!(f.repo.messages().is_empty());
        assert!(f.session.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_text_sends_nothing() {
        let f = fixture(MONDAY_10AM).await;
        f.handler.handle(&f.account, text("+6281", "hello?")).await;
        assert!(f.session.sent().is_empty());
        assert_eq!(f.repo.messages().len(), 1);
    }
}
