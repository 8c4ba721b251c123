use crate::error::{AppError, Result};
use crate::models::Signal;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn send_message(&self, text: &str) -> Result<()>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(client: Client, base_url: &str, bot_token: Option<String>, chat_id: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.unwrap_or_default().trim().to_string(),
            chat_id: chat_id.unwrap_or_default().trim().to_string(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        if !self.is_configured() {
            return Err(AppError::Notify("Telegram is not configured".to_string()));
        }

        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            .map_err(|e| AppError::Notify(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        let reply: Option<TelegramReply> = response.json().await.ok();
        match reply {
            Some(TelegramReply { ok: true, .. }) if status.is_success() => Ok(()),
            Some(TelegramReply { description, .. }) => Err(AppError::Notify(format!(
                "Telegram rejected the message ({}): {}",
                status,
                description.unwrap_or_default()
            ))),
            None => Err(AppError::Notify(format!("Telegram returned {} with an unreadable body", status))),
        }
    }
}

fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
    value
        .map(|v| format!("{:.2}{}", v, suffix))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Plain-text alert for one signal.
pub fn format_signal_message(signal: &Signal) -> String {
    let p = &signal.payload;
    let o = &p.observation;
    let mut text = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(text, "🚨 Signal: {}", signal.asset);
    let _ = writeln!(text, "Type: {}", signal.kind.as_str());
    let _ = writeln!(text, "Severity: {}", signal.severity.as_str());
    let _ = writeln!(text);
    let _ = writeln!(
        text,
        "Peak: {} at {:.2}",
        o.peak_time.format("%Y-%m-%d %H:%M UTC"),
        o.peak_price
    );
    let _ = writeln!(text, "Current price: {:.2}", o.current_price);
    let _ = writeln!(text, "Drop from peak: {:.2}%", o.drop_pct);
    let _ = writeln!(text, "RSI: {}", fmt_opt(o.rsi, ""));
    let _ = writeln!(text, "{} since peak: {}", p.benchmark, fmt_opt(p.benchmark_change_pct, "%"));
    let _ = writeln!(text);
    let _ = writeln!(text, "Automated signal, do your own research before trading.");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::t0;
    use crate::models::{DrawdownObservation, Severity, SignalKind, SignalPayload};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn signal(benchmark_change_pct: Option<f64>) -> Signal {
        Signal {
            asset: "ethereum".to_string(),
            kind: SignalKind::NewHighDrop,
            severity: Severity::High,
            drop_pct: 27.456,
            payload: SignalPayload {
                observation: DrawdownObservation {
                    peak_time: t0(),
                    peak_price: 4000.0,
                    current_price: 2901.76,
                    drop_pct: 27.456,
                    rsi: Some(22.789),
                },
                benchmark: "bitcoin".to_string(),
                benchmark_change_pct,
            },
            generated_at: t0(),
        }
    }

    #[test]
    fn message_lists_the_payload() {
        let text = format_signal_message(&signal(Some(-4.126)));
        assert!(text.contains("Signal: ethereum"));
        assert!(text.contains("Type: new-high-drop"));
        assert!(text.contains("Severity: high"));
        assert!(text.contains("Peak: 2024-03-01 00:00 UTC at 4000.00"));
        assert!(text.contains("Drop from peak: 27.46%"));
        assert!(text.contains("RSI: 22.79"));
        assert!(text.contains("bitcoin since peak: -4.13%"));
    }

    #[test]
    fn missing_benchmark_reads_na() {
        let text = format_signal_message(&signal(None));
        assert!(text.contains("bitcoin since peak: n/a"));
    }

    #[tokio::test]
    async fn sends_to_bot_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_json(serde_json::json!({"chat_id": "42", "text": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(Client::new(), &server.uri(), Some("TOKEN".into()), Some(" 42 ".into()));
        assert!(notifier.is_configured());
        notifier.send_message("hello").await.unwrap();
    }

    #[tokio::test]
    async fn rejected_message_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"ok": false, "description": "chat not found"})),
            )
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(Client::new(), &server.uri(), Some("TOKEN".into()), Some("1".into()));
        let err = notifier.send_message("hello").await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn unconfigured_refuses_to_send() {
        let notifier = TelegramNotifier::new(Client::new(), "http://127.0.0.1:9", None, Some("1".into()));
        assert!(!notifier.is_configured());
        assert!(matches!(notifier.send_message("x").await, Err(AppError::Notify(_))));
    }
}
