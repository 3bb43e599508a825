// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end engine scenarios driven through mock sessions.
//!
//! Setup runs on real time; tests that measure pacing pause the tokio
//! clock once the accounts exist.

use std::time::Duration;

use courier_core::{
    Clock, Direction, FieldUpdate, MessageClass, MessageQuery, MessageScope, NewUser,
    PairingEvent, UserUpdate,
};
use courier_engine::{BroadcastStatus, DenyReason, Job, JobOutcome, NewBroadcast, Pairing, Verdict};
use courier_test_utils::TestHarness;
use tokio::sync::oneshot;
use tokio::time::Instant;

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn keyword_reply_through_the_event_pump() {
    let h = TestHarness::builder()
        .with_config(|c| {
            c.bot.away_enabled = false;
            c.bot.keywords.insert("jadwal".into(), "J".into());
        })
        .build()
        .await
        .unwrap();
    let (acc, session) = h.connected_account("Main").await.unwrap();
    tokio::time::pause();

    h.inject_text(&acc, "+6281", " Jadwal ").await;
    let sent = session.wait_for_sent(1).await;
    assert_eq!(sent[0].text, "J");
    assert_eq!(sent[0].to, "6281");

    let memory = h.memory.clone().unwrap();
    wait_for(|| memory.messages().len() == 2).await;
    let users = memory.users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].phone, "+6281");
    assert_eq!(users[0].account_id.as_deref(), Some(acc.as_str()));

    let log = memory.messages();
    assert_eq!((log[0].direction, &log[0].class), (Direction::Incoming, &MessageClass::User));
    assert_eq!((log[1].direction, &log[1].class), (Direction::Outgoing, &MessageClass::Reply));
    assert_eq!(log[1].content, "J");
}

#[tokio::test]
async fn away_hours_send_only_the_away_text() {
    let h = TestHarness::builder()
        .with_start("2026-03-02T22:00:00+07:00")
        .with_config(|c| {
            c.bot.away_enabled = true;
            c.bot.away_message = "closed".into();
        })
        .build()
        .await
        .unwrap();
    let (acc, session) = h.connected_account("Main").await.unwrap();
    tokio::time::pause();

    h.inject_text(&acc, "+6281", "jadwal").await;
    session.wait_for_sent(1).await;
    let memory = h.memory.clone().unwrap();
    wait_for(|| memory.messages().len() == 2).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(session.sent_texts(), vec!["closed"]);
    assert_eq!(memory.messages()[1].class, MessageClass::Away);
    assert!(memory.users()[0].opt_in);
}

#[tokio::test]
async fn auto_reply_off_produces_no_outbound() {
    let h = TestHarness::builder().build().await.unwrap();
    let (acc, session) = h.connected_account("Main").await.unwrap();
    h.core.settings.set_auto_reply_enabled(false);
    tokio::time::pause();

    for text in ["info", "jadwal", "stop"] {
        h.inject_text(&acc, "+6281", text).await;
    }
    let memory = h.memory.clone().unwrap();
    wait_for(|| memory.messages().len() == 3).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(session.sent().is_empty());
}

#[tokio::test]
async fn messages_from_one_sender_are_handled_in_order() {
    let h = TestHarness::builder()
        .with_config(|c| {
            c.bot.away_enabled = false;
            c.bot.keywords.insert("a".into(), "reply-a".into());
            c.bot.keywords.insert("b".into(), "reply-b".into());
            c.bot.keywords.insert("c".into(), "reply-c".into());
        })
        .build()
        .await
        .unwrap();
    let (acc, session) = h.connected_account("Main").await.unwrap();
    tokio::time::pause();

    for text in ["a", "b", "c"] {
        h.inject_text(&acc, "+6281", text).await;
    }
    session.wait_for_sent(3).await;
    assert_eq!(session.sent_texts(), vec!["reply-a", "reply-b", "reply-c"]);
}

#[tokio::test]
async fn system_cap_denies_within_24_hours() {
    let h = TestHarness::builder().build().await.unwrap();
    let memory = h.memory.clone().unwrap();
    let user = h
        .repo
        .create_user(&NewUser {
            phone: "+62X".into(),
            account_id: Some("acc1".into()),
            name: None,
        })
        .await
        .unwrap();
    let ten_hours_ago = h.clock.now_utc() - chrono::Duration::hours(10);
    h.repo
        .update_user(
            &user.id,
            &UserUpdate {
                last_system_sent_at: Some(FieldUpdate::Set(ten_hours_ago)),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();

    let verdict = h.core.policy.validate(&MessageClass::System, "+62X").await;
    assert_eq!(verdict, Verdict::Deny(DenyReason::DailyCap));
    assert_eq!(verdict.reason().unwrap().to_string(), "daily cap");

    // Tuesday 10:00, back inside operating hours.
    h.clock.advance(chrono::Duration::hours(24));
    assert!(h.core.policy.validate(&MessageClass::System, "+62X").await.is_allowed());
    assert_eq!(memory.users().len(), 1);
}

#[tokio::test]
async fn queue_honours_not_before_in_fifo_order() {
    let h = TestHarness::builder().build().await.unwrap();
    let (_, session) = h.connected_account("Main").await.unwrap();
    tokio::time::pause();

    let now = h.clock.now_utc();
    let start = Instant::now();
    h.core
        .queue
        .enqueue(Job::new("+621", "J1", MessageClass::Manual, now + chrono::Duration::seconds(5)))
        .await
        .unwrap();
    h.core
        .queue
        .enqueue(Job::new("+622", "J2", MessageClass::Manual, now))
        .await
        .unwrap();

    let sent = session.wait_for_sent(2).await;
    assert_eq!(sent[0].text, "J1");
    assert_eq!(sent[1].text, "J2");
    assert!(sent[0].at - start >= Duration::from_secs(5));
}

#[tokio::test]
async fn second_system_job_is_denied_by_the_cap() {
    let h = TestHarness::builder().build().await.unwrap();
    let (acc, session) = h.connected_account("Main").await.unwrap();
    h.repo
        .create_user(&NewUser {
            phone: "+6281".into(),
            account_id: Some(acc.clone()),
            name: None,
        })
        .await
        .unwrap();
    tokio::time::pause();

    let mut outcomes = Vec::new();
    for text in ["first", "second"] {
        let (tx, rx) = oneshot::channel();
        h.core
            .queue
            .enqueue(
                Job::new("+6281", text, MessageClass::System, h.clock.now_utc())
                    .from_account(acc.clone())
                    .on_complete(move |o| {
                        let _ = tx.send(o);
                    }),
            )
            .await
            .unwrap();
        outcomes.push(rx);
    }
    let mut results = Vec::new();
    for rx in outcomes {
        results.push(rx.await.unwrap());
    }
    assert!(matches!(results[0], JobOutcome::Sent(_)));
    assert_eq!(results[1], JobOutcome::Denied(DenyReason::DailyCap));
    assert_eq!(session.sent_texts(), vec!["first"]);
}

#[tokio::test]
async fn broadcast_paces_and_cancels() {
    let h = TestHarness::builder().build().await.unwrap();
    let (acc, session) = h.connected_account("Main").await.unwrap();
    tokio::time::pause();

    let b = h
        .core
        .broadcasts
        .create(NewBroadcast {
            name: "promo".into(),
            message: "sale".into(),
            account_id: acc.clone(),
            recipients: vec!["+621".into(), "+622".into(), "+623".into(), "+624".into()],
            delay_ms: Some(100),
        })
        .unwrap();
    h.core.broadcasts.start(&b.id).unwrap();

    session.wait_for_sent(1).await;
    let registry = h.core.broadcasts.clone();
    let id = b.id.clone();
    wait_for(move || registry.get(&id).unwrap().sent == 1).await;
    h.core.broadcasts.cancel(&b.id).unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    let done = h.core.broadcasts.get(&b.id).unwrap();
    assert_eq!(done.status, BroadcastStatus::Cancelled);
    assert!(done.sent <= 2);
    let sent = session.sent();
    for pair in sent.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(3000));
    }
}

#[tokio::test]
async fn pairing_lifecycle_for_fresh_and_logged_in_accounts() {
    let h = TestHarness::builder().build().await.unwrap();
    let info = h.core.manager.add("Fresh").await.unwrap();
    let session = h.session(&info.id).unwrap();
    session.set_pairing_script(vec![
        PairingEvent::Code("c1".into()),
        PairingEvent::Code("c2".into()),
        PairingEvent::Success,
    ]);

    let Pairing::Stream(mut rx) = h.core.manager.pairing(&info.id).await.unwrap() else {
        panic!("fresh account should pair");
    };
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    assert_eq!(
        events,
        vec![
            PairingEvent::Code("c1".into()),
            PairingEvent::Code("c2".into()),
            PairingEvent::Success
        ]
    );

    assert!(matches!(
        h.core.manager.pairing(&info.id).await.unwrap(),
        Pairing::AlreadyLoggedIn
    ));
}

#[tokio::test]
async fn paired_default_session_reconnects() {
    let h = TestHarness::builder()
        .with_paired_session("default", "628100")
        .build()
        .await
        .unwrap();
    // Nothing is indexed, so the default account is created on demand.
    let account = h.core.manager.ensure_default().await.unwrap();
    assert_eq!(account.id(), "default");
    assert_eq!(h.core.manager.connect_all().await, 1);
    let status = h.core.manager.status("default").await.unwrap();
    assert!(status.is_connected && status.is_logged_in);
    assert_eq!(status.phone, "628100");
}

#[tokio::test]
async fn sqlite_store_records_keyword_exchange() {
    let h = TestHarness::builder()
        .with_sqlite()
        .with_config(|c| {
            c.policy.min_delay_seconds = 1;
            c.policy.max_delay_seconds = 1;
            c.bot.away_enabled = false;
            c.bot.keywords.insert("ping".into(), "pong".into());
        })
        .build()
        .await
        .unwrap();
    let (acc, session) = h.connected_account("Main").await.unwrap();

    h.inject_text(&acc, "+6281", "PING").await;
    session.wait_for_sent(1).await;

    let repo = h.repo.clone();
    let mut log = Vec::new();
    for _ in 0..500 {
        log = repo
            .list_messages(&MessageQuery::new(MessageScope::Account(acc.clone()), 10, 0))
            .await
            .unwrap();
        if log.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(log.len(), 2);
    assert!(log.iter().any(|m| m.class == MessageClass::Reply && m.content == "pong"));
    let user = repo
        .find_user_by_phone_and_account("+6281", &acc)
        .await
        .unwrap()
        .unwrap();
    assert!(user.last_user_message_at.is_some());
    assert!(user.opt_in);
}
