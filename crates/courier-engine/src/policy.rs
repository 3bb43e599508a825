// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anti-abuse policy gate shared by every policy-checked outbound path.
//!
//! The operator API, the queue worker and the scheduler all ask the same
//! validator before sending. Broadcasts and inbound auto-replies do not pass
//! through here.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use courier_core::{Clock, CourierError, MessageClass, Repository, User};

use crate::rpc::with_deadline;
use crate::settings::Settings;

/// Minimum spacing, in hours, between two system-class messages to one user.
pub const SYSTEM_CAP_HOURS: i64 = 24;

/// Why a candidate send was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
pub enum DenyReason {
    #[strum(serialize = "store error")]
    StoreError,
    #[strum(serialize = "unknown recipient")]
    UnknownRecipient,
    #[strum(serialize = "blocked")]
    Blocked,
    #[strum(serialize = "opted out")]
    OptedOut,
    #[strum(serialize = "outside hours")]
    OutsideHours,
    #[strum(serialize = "daily cap")]
    DailyCap,
    #[strum(serialize = "bulk class prohibited through policy path")]
    BulkClass,
    #[strum(serialize = "unknown class")]
    UnknownClass,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(*reason),
        }
    }

    /// Converts a denial into [`CourierError::PolicyDenied`].
    pub fn into_result(self) -> Result<(), CourierError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(CourierError::PolicyDenied {
                reason: reason.to_string(),
            }),
        }
    }
}

/// Wire form of a verdict, as returned by `GET /api/validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictView {
    pub can_send: bool,
    pub reason: String,
}

impl From<Verdict> for VerdictView {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Allow => Self {
                can_send: true,
                reason: "ok".to_string(),
            },
            Verdict::Deny(reason) => Self {
                can_send: false,
                reason: reason.to_string(),
            },
        }
    }
}

/// Decides whether a message of a given class may go to a recipient.
pub struct PolicyValidator {
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
    rpc_timeout: Duration,
}

impl PolicyValidator {
    pub fn new(
        repo: Arc<dyn Repository>,
        settings: Arc<Settings>,
        clock: Arc<dyn Clock>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            settings,
            clock,
            rpc_timeout,
        }
    }

    pub async fn validate(&self, class: &MessageClass, phone: &str) -> Verdict {
        match class {
            MessageClass::Reply | MessageClass::Manual => self.check_reply(phone).await,
            MessageClass::System => self.check_system(phone).await,
            MessageClass::Promo | MessageClass::Broadcast | MessageClass::Blast => {
                Verdict::Deny(DenyReason::BulkClass)
            }
            MessageClass::User | MessageClass::Away | MessageClass::Unknown(_) => {
                Verdict::Deny(DenyReason::UnknownClass)
            }
        }
    }

    async fn lookup(&self, phone: &str) -> Result<Option<User>, CourierError> {
        with_deadline(self.rpc_timeout, self.repo.find_user_by_phone(phone)).await
    }

    async fn check_reply(&self, phone: &str) -> Verdict {
        match self.lookup(phone).await {
            Err(e) => {
                warn!(phone = %phone, error = %e, "policy lookup failed");
                Verdict::Deny(DenyReason::StoreError)
            }
            Ok(Some(user)) if user.blocked => Verdict::Deny(DenyReason::Blocked),
            Ok(_) => Verdict::Allow,
        }
    }

    async fn check_system(&self, phone: &str) -> Verdict {
        let user = match self.lookup(phone).await {
            Err(e) => {
                warn!(phone = %phone, error = %e, "policy lookup failed");
                return Verdict::Deny(DenyReason::StoreError);
            }
            Ok(None) => return Verdict::Deny(DenyReason::UnknownRecipient),
            Ok(Some(user)) => user,
        };

        if user.blocked {
            return Verdict::Deny(DenyReason::Blocked);
        }
        if !user.opt_in {
            return Verdict::Deny(DenyReason::OptedOut);
        }
        if !self.settings.is_within_operating_hours() {
            return Verdict::Deny(DenyReason::OutsideHours);
        }
        if let Some(last) = user.last_system_sent_at
            && self.clock.now_utc() - last < chrono::Duration::hours(SYSTEM_CAP_HOURS)
        {
            return Verdict::Deny(DenyReason::DailyCap);
        }
        Verdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use courier_config::model::{BotConfig, PolicyConfig};
    use courier_core::{FieldUpdate, MockClock, NewUser, UserUpdate};
    use courier_test_utils::MemoryRepository;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        clock: Arc<MockClock>,
        policy: PolicyValidator,
    }

    // Monday 10:00 local.
    fn fixture() -> Fixture {
        let clock = Arc::new(MockClock::new(
            DateTime::parse_from_rfc3339("2026-03-02T10:00:00+07:00").unwrap(),
        ));
        let repo = Arc::new(MemoryRepository::new(clock.clone()));
        let settings = Arc::new(Settings::from_config(
            &PolicyConfig::default(),
            &BotConfig::default(),
            clock.clone(),
        ));
        let policy = PolicyValidator::new(
            repo.clone(),
            settings,
            clock.clone(),
            Duration::from_secs(5),
        );
        Fixture {
            repo,
            clock,
            policy,
        }
    }

    async fn user(repo: &MemoryRepository, phone: &str, update: UserUpdate) {
        let user = repo
            .create_user(&NewUser {
                phone: phone.into(),
                account_id: Some("acc1".into()),
                name: None,
            })
            .await
            .unwrap();
        repo.update_user(&user.id, &update).await.unwrap();
    }

    #[tokio::test]
    async fn system_cap_denies_within_24h() {
        let f = fixture();
        let ten_hours_ago = f.clock.now_utc() - chrono::Duration::hours(10);
        user(
            &f.repo,
            "+62X",
            UserUpdate {
                last_system_sent_at: Some(FieldUpdate::Set(ten_hours_ago)),
                ..UserUpdate::default()
            },
        )
        .await;

        let verdict = f.policy.validate(&MessageClass::System, "+62X").await;
        assert_eq!(verdict, Verdict::Deny(DenyReason::DailyCap));
        assert_eq!(verdict.reason().unwrap().as_str(), "daily cap");
    }

    #[tokio::test]
    async fn system_allowed_after_window() {
        let f = fixture();
        let yesterday = f.clock.now_utc() - chrono::Duration::hours(25);
        user(
            &f.repo,
            "+62X",
            UserUpdate {
                last_system_sent_at: Some(FieldUpdate::Set(yesterday)),
                ..UserUpdate::default()
            },
        )
        .await;
        assert!(f.policy.validate(&MessageClass::System, "+62X").await.is_allowed());
    }

    #[tokio::test]
    async fn system_rules_apply_in_order() {
        let f = fixture();
        assert_eq!(
            f.policy.validate(&MessageClass::System, "+62none").await,
            Verdict::Deny(DenyReason::UnknownRecipient)
        );

        user(
            &f.repo,
            "+62B",
            UserUpdate {
                blocked: Some(true),
                opt_in: Some(false),
                ..UserUpdate::default()
            },
        )
        .await;
        assert_eq!(
            f.policy.validate(&MessageClass::System, "+62B").await,
            Verdict::Deny(DenyReason::Blocked)
        );

        user(&f.repo, "+62O", UserUpdate::opt_in(false)).await;
        assert_eq!(
            f.policy.validate(&MessageClass::System, "+62O").await,
            Verdict::Deny(DenyReason::OptedOut)
        );

        user(&f.repo, "+62H", UserUpdate::default()).await;
        f.clock
            .set(DateTime::parse_from_rfc3339("2026-03-02T20:00:00+07:00").unwrap());
        assert_eq!(
            f.policy.validate(&MessageClass::System, "+62H").await,
            Verdict::Deny(DenyReason::OutsideHours)
        );
    }

    #[tokio::test]
    async fn system_denied_on_sunday() {
        let f = fixture();
        user(&f.repo, "+62S", UserUpdate::default()).await;
        f.clock
            .set(DateTime::parse_from_rfc3339("2026-03-08T10:00:00+07:00").unwrap());
        assert_eq!(
            f.policy.validate(&MessageClass::System, "+62S").await,
            Verdict::Deny(DenyReason::OutsideHours)
        );
    }

    #[tokio::test]
    async fn reply_and_manual_allow_unknown_users_but_not_blocked() {
        let f = fixture();
        assert!(f.policy.validate(&MessageClass::Reply, "+62new").await.is_allowed());
        assert!(f.policy.validate(&MessageClass::Manual, "+62new").await.is_allowed());

        user(
            &f.repo,
            "+62B",
            UserUpdate {
                blocked: Some(true),
                ..UserUpdate::default()
            },
        )
        .await;
        assert_eq!(
            f.policy.validate(&MessageClass::Manual, "+62B").await,
            Verdict::Deny(DenyReason::Blocked)
        );
    }

    #[tokio::test]
    async fn bulk_and_unknown_classes_are_denied() {
        let f = fixture();
        for class in [MessageClass::Promo, MessageClass::Broadcast, MessageClass::Blast] {
            assert_eq!(
                f.policy.validate(&class, "+62").await,
                Verdict::Deny(DenyReason::BulkClass)
            );
        }
        let class: MessageClass = "newsletter".parse().unwrap();
        assert_eq!(
            f.policy.validate(&class, "+62").await,
            Verdict::Deny(DenyReason::UnknownClass)
        );
    }

    #[tokio::test]
    async fn store_error_denies() {
        let f = fixture();
        f.repo.fail_next("connection reset");
        let verdict = f.policy.validate(&MessageClass::Reply, "+62").await;
        assert_eq!(verdict, Verdict::Deny(DenyReason::StoreError));

        let err = verdict.into_result().unwrap_err();
        assert_eq!(err.to_string(), "policy denied: store error");
    }

    #[test]
    fn verdict_view_shape() {
        let view = VerdictView::from(Verdict::Deny(DenyReason::OutsideHours));
        assert!(!view.can_send);
        assert_eq!(view.reason, "outside hours");
        assert!(VerdictView::from(Verdict::Allow).can_send);
    }
}
