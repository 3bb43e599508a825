// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier pair` command implementation.
//!
//! Opens the pairing socket of a running server and renders every pairing
//! code as a terminal QR image until the server reports the outcome.

use std::io::Write;

use futures::StreamExt;
use qrcode::QrCode;
use qrcode::render::unicode;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use courier_config::CourierConfig;
use courier_core::CourierError;
use courier_gateway::PairingFrame;

use crate::status::gateway_base;

/// How a pairing socket ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Paired,
    AlreadyConnected,
    TimedOut,
    Failed(String),
}

/// Run the `courier pair` command.
pub async fn run_pair(config: &CourierConfig, account: Option<&str>) -> Result<(), CourierError> {
    let url = pairing_url(
        &gateway_base(config),
        account,
        config.gateway.bearer_token.as_deref(),
    )?;

    let mut out = std::io::stdout();
    match watch(&url, &mut out).await? {
        PairOutcome::Paired => {
            println!("Paired.");
            Ok(())
        }
        PairOutcome::AlreadyConnected => {
            println!("Account is already paired and connected.");
            Ok(())
        }
        PairOutcome::TimedOut => Err(CourierError::Unavailable(
            "pairing code expired; run `courier pair` again".into(),
        )),
        PairOutcome::Failed(reason) => Err(CourierError::messenger(format!("pairing failed: {reason}"))),
    }
}

/// Pairing socket URL on the gateway at `base`.
pub fn pairing_url(base: &str, account: Option<&str>, token: Option<&str>) -> Result<Url, CourierError> {
    let mut url = Url::parse(base)
        .map_err(|e| CourierError::Config(format!("invalid gateway address {base:?}: {e}")))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| CourierError::Config(format!("cannot derive socket url from {base}")))?;

    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        match account {
            Some(id) => path.extend(["api", "accounts", id, "qr"]),
            None => path.extend(["api", "qr"]),
        };
    }
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

/// Renders a pairing code as a block-character QR image.
pub fn render_qr(code: &str) -> Result<String, CourierError> {
    let qr = QrCode::new(code.as_bytes())
        .map_err(|e| CourierError::Internal(format!("cannot encode pairing code: {e}")))?;
    Ok(qr
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Follows one pairing socket, writing each code to `out`.
pub async fn watch<W: Write>(url: &Url, out: &mut W) -> Result<PairOutcome, CourierError> {
    let (mut ws, _) = connect_async(url.as_str())
        .await
        .map_err(|e| CourierError::Unavailable(format!("cannot reach pairing socket: {e}")))?;

    while let Some(msg) = ws.next().await {
        let msg = msg.map_err(|e| CourierError::Unavailable(format!("pairing socket failed: {e}")))?;
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame: PairingFrame = serde_json::from_str(&text)
            .map_err(|e| CourierError::Internal(format!("unexpected pairing frame: {e}")))?;

        match frame {
            PairingFrame::Qr { code } => {
                let image = render_qr(&code)?;
                writeln!(out, "{image}\nScan with WhatsApp > Linked devices\n")
                    .map_err(|e| CourierError::Internal(format!("cannot write QR code: {e}")))?;
            }
            PairingFrame::Success => return Ok(PairOutcome::Paired),
            PairingFrame::Connected => return Ok(PairOutcome::AlreadyConnected),
            PairingFrame::Timeout => return Ok(PairOutcome::TimedOut),
            PairingFrame::Error { code } => return Ok(PairOutcome::Failed(code)),
        }
    }

    Err(CourierError::Unavailable(
        "pairing socket closed before a result".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::PairingEvent;
    use courier_gateway::{AuthConfig, GatewayState, router, serve};
    use courier_test_utils::TestHarness;

    #[test]
    fn pairing_url_targets_account_or_default() {
        let url = pairing_url("http://127.0.0.1:8080", Some("ab12cd34"), None).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8080/api/accounts/ab12cd34/qr");

        let url = pairing_url("http://127.0.0.1:8080", None, Some("s3cret")).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8080/api/qr?token=s3cret");

        let url = pairing_url("https://admin.example", None, Some("")).unwrap();
        assert_eq!(url.as_str(), "wss://admin.example/api/qr");
    }

    #[test]
    fn qr_renders_as_block_characters() {
        let image = render_qr("2@AbCdEf,123,456").unwrap();
        assert!(image.lines().count() > 10);
        assert!(image.chars().any(|c| matches!(c, '█' | '▀' | '▄')));
    }

    #[tokio::test]
    async fn watch_follows_a_live_pairing_socket() {
        let h = TestHarness::builder().build().await.unwrap();
        let info = h.core.manager.add("Fresh").await.unwrap();
        h.session(&info.id).unwrap().set_pairing_script(vec![
            PairingEvent::Code("c1".into()),
            PairingEvent::Code("c2".into()),
            PairingEvent::Success,
        ]);

        let app = router(GatewayState::new(h.core.clone(), AuthConfig::new(None)), &[]);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, app, async {
            let _ = stopped.await;
        }));

        let url = pairing_url(&base, Some(&info.id), None).unwrap();
        let mut out = Vec::new();
        assert_eq!(watch(&url, &mut out).await.unwrap(), PairOutcome::Paired);
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("Linked devices").count(), 2);

        let mut out = Vec::new();
        assert_eq!(
            watch(&url, &mut out).await.unwrap(),
            PairOutcome::AlreadyConnected
        );
        assert!(out.is_empty());

        let missing = pairing_url(&base, Some("nope"), None).unwrap();
        assert!(matches!(
            watch(&missing, &mut Vec::new()).await.unwrap(),
            PairOutcome::Failed(reason) if reason.contains("not found")
        ));

        let _ = stop.send(());
        server.await.unwrap().unwrap();
    }
}
