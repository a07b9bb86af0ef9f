//! Webhook delivery.
//!
//! Messages are POSTed as JSON, one payload at a time in send order. Network
//! errors, `429` and `5xx` answers are retried with exponential backoff,
//! honouring `Retry-After` when the server sends one. Webhook URLs carry
//! their secret token in the path, so they are wrapped in [`WebhookUrl`] and
//! never logged; log lines only name the platform.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use calendarr_core::{
    Batch, Platform, PlatformFormatter, PlatformMessage, pack, split_block, split_target,
};

use crate::error::{ServerError, ServerResult};

/// A webhook URL. `Debug` and `Display` never show it.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookUrl(String);

impl WebhookUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The full URL, token included.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookUrl(<redacted>)")
    }
}

impl fmt::Display for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Status codes each platform answers a successful POST with.
pub fn success_codes(platform: Platform) -> &'static [u16] {
    match platform {
        Platform::Discord => &[200, 204],
        Platform::Slack => &[200, 201, 204],
    }
}

/// Retry behaviour for a single payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Why a single POST did not succeed.
enum Failure {
    Retryable { reason: String, wait: Option<Duration> },
    Fatal(String),
}

/// POSTs payloads to chat webhooks.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    retry: RetryPolicy,
}

impl WebhookClient {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration, retry: RetryPolicy) -> ServerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("calendarr/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServerError::http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, retry })
    }

    /// Sends one payload, retrying transient failures.
    pub async fn post(&self, platform: Platform, url: &WebhookUrl, payload: &Value) -> ServerResult<()> {
        let mut attempt = 0;
        loop {
            match self.post_once(platform, url, payload).await {
                Ok(()) => return Ok(()),
                Err(Failure::Fatal(reason)) => {
                    warn!(platform = %platform, "Webhook rejected message: {reason}");
                    return Err(ServerError::delivery(platform, reason));
                }
                Err(Failure::Retryable { reason, wait }) => {
                    attempt += 1;
                    if attempt > self.retry.max_retries {
                        warn!(
                            platform = %platform,
                            attempts = attempt,
                            "Giving up on webhook: {reason}"
                        );
                        return Err(ServerError::delivery(
                            platform,
                            format!("{reason} (after {attempt} attempts)"),
                        ));
                    }
                    let delay = wait
                        .unwrap_or_else(|| self.retry.backoff_delay(attempt))
                        .min(self.retry.max_backoff);
                    warn!(
                        platform = %platform,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Webhook request failed, retrying: {reason}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn post_once(&self, platform: Platform, url: &WebhookUrl, payload: &Value) -> Result<(), Failure> {
        let response = self
            .client
            .post(url.expose())
            .json(payload)
            .send()
            .await
            .map_err(|e| Failure::Retryable {
                // Without the URL: reqwest would print it, token included.
                reason: e.without_url().to_string(),
                wait: None,
            })?;

        let status = response.status();
        debug!(platform = %platform, status = status.as_u16(), "Webhook responded");
        if success_codes(platform).contains(&status.as_u16()) {
            return Ok(());
        }

        let wait = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        let reason = format!("status {}: {}", status.as_u16(), truncate(&body, 200));

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(Failure::Retryable { reason, wait })
        } else {
            Err(Failure::Fatal(reason))
        }
    }

    /// Sends a whole message: header, batches, footer.
    ///
    /// Oversized batches are split at line boundaries and repacked first.
    /// Sending stops at the first payload that cannot be delivered.
    pub async fn deliver(
        &self,
        message: &PlatformMessage,
        formatter: &dyn PlatformFormatter,
        url: &WebhookUrl,
    ) -> ServerResult<usize> {
        let platform = message.platform;
        let batches = fit_batches(&message.batches, formatter);

        let payloads: Vec<&Value> = std::iter::once(&message.header_payload)
            .chain(batches.iter().map(|b| &b.payload))
            .chain(message.footer_payload.iter())
            .collect();

        for (index, payload) in payloads.iter().enumerate() {
            self.post(platform, url, payload).await?;
            debug!(platform = %platform, index, total = payloads.len(), "Payload sent");
        }

        info!(
            platform = %platform,
            messages = payloads.len(),
            lines = message.line_count(),
            "Report delivered"
        );
        Ok(payloads.len())
    }
}

/// Replaces oversized batches with split, repacked ones.
pub fn fit_batches(batches: &[Batch], formatter: &dyn PlatformFormatter) -> Vec<Batch> {
    let limits = formatter.limits();
    let mut fitted = Vec::with_capacity(batches.len());

    for batch in batches {
        if !batch.is_oversized() {
            fitted.push(batch.clone());
            continue;
        }
        let pieces = batch
            .blocks
            .iter()
            .flat_map(|block| split_block(block, split_target(block, &limits)))
            .collect();
        let mut repacked = pack(pieces, &limits);
        debug!(
            platform = %formatter.platform(),
            parts = repacked.len(),
            "Split oversized batch"
        );
        for part in &mut repacked {
            part.payload = formatter.batch_payload(part);
        }
        fitted.extend(repacked);
    }
    fitted
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendarr_core::{DiscordFormatter, FormattedBlock, SlackFormatter};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_client(retries: u32) -> WebhookClient {
        let retry = RetryPolicy::default()
            .with_max_retries(retries)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5));
        WebhookClient::new(Duration::from_secs(5), retry).unwrap()
    }

    fn hook(server: &MockServer) -> WebhookUrl {
        WebhookUrl::new(format!("{}/api/webhooks/123/token", server.uri()))
    }

    fn message(platform: Platform, batches: Vec<Batch>) -> PlatformMessage {
        PlatformMessage {
            platform,
            header: "# TV Guide".to_string(),
            subheader: String::new(),
            mention: None,
            header_payload: json!({"content": "header"}),
            batches,
            footer_payload: Some(json!({"content": "footer"})),
        }
    }

    mod url {
        use super::*;

        #[test]
        fn never_printed() {
            let url = WebhookUrl::new("https://discord.com/api/webhooks/1/secret-token");
            assert!(!format!("{url:?}").contains("secret"));
            assert!(!format!("{url}").contains("secret"));
            assert!(url.expose().ends_with("secret-token"));
        }
    }

    mod policy {
        use super::*;

        #[test]
        fn backoff_doubles_and_caps() {
            let policy = RetryPolicy::default()
                .with_backoff(Duration::from_secs(1), Duration::from_secs(5));
            assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
            assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
            assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
            assert_eq!(policy.backoff_delay(4), Duration::from_secs(5));
            assert_eq!(policy.backoff_delay(40), Duration::from_secs(5));
        }

        #[test]
        fn codes() {
            assert_eq!(success_codes(Platform::Discord), &[200, 204]);
            assert!(success_codes(Platform::Slack).contains(&201));
            assert!(!success_codes(Platform::Discord).contains(&201));
        }
    }

    mod posting {
        use super::*;

        #[tokio::test]
        async fn posts_json() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/webhooks/123/token"))
                .and(header("content-type", "application/json"))
                .and(body_json(json!({"content": "hi"})))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            fast_client(0)
                .post(Platform::Discord, &hook(&server), &json!({"content": "hi"}))
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn retries_server_errors() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(502))
                .up_to_n_times(2)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&server)
                .await;

            fast_client(3)
                .post(Platform::Slack, &hook(&server), &json!({"text": "hi"}))
                .await
                .unwrap();
            assert_eq!(server.received_requests().await.unwrap().len(), 3);
        }

        #[tokio::test]
        async fn honours_retry_after() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
                .up_to_n_times(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(204))
                .mount(&server)
                .await;

            fast_client(1)
                .post(Platform::Discord, &hook(&server), &json!({}))
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn client_errors_are_not_retried() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(400).set_body_string("invalid embed"))
                .expect(1)
                .mount(&server)
                .await;

            let err = fast_client(3)
                .post(Platform::Discord, &hook(&server), &json!({}))
                .await
                .unwrap_err();
            let text = err.to_string();
            assert!(text.contains("status 400"));
            assert!(text.contains("invalid embed"));
            assert!(!text.contains("token"));
        }

        #[tokio::test]
        async fn wrong_success_code_for_platform() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(201))
                .mount(&server)
                .await;

            assert!(
                fast_client(0)
                    .post(Platform::Discord, &hook(&server), &json!({}))
                    .await
                    .is_err()
            );
            assert!(
                fast_client(0)
                    .post(Platform::Slack, &hook(&server), &json!({}))
                    .await
                    .is_ok()
            );
        }

        #[tokio::test]
        async fn gives_up_after_retries() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let err = fast_client(2)
                .post(Platform::Slack, &hook(&server), &json!({}))
                .await
                .unwrap_err();
            assert!(matches!(err, ServerError::Delivery { platform: Platform::Slack, .. }));
            assert_eq!(server.received_requests().await.unwrap().len(), 3);
        }
    }

    mod delivery {
        use super::*;

        fn oversized_batch(formatter: &dyn PlatformFormatter) -> Batch {
            let body = (0..400)
                .map(|i| format!("09:00: **Show {i:03}** - S01E01 - *Episode*"))
                .collect::<Vec<_>>()
                .join("\n");
            let block = FormattedBlock::new("Monday, Mar 10", body, 0, 400);
            let mut batches = pack(vec![block], &formatter.limits());
            for batch in &mut batches {
                batch.payload = formatter.batch_payload(batch);
            }
            assert!(batches[0].is_oversized());
            batches.remove(0)
        }

        #[test]
        fn splits_oversized_batches() {
            let formatter = DiscordFormatter::new();
            let batch = oversized_batch(&formatter);
            let fitted = fit_batches(std::slice::from_ref(&batch), &formatter);

            assert!(fitted.len() > 1);
            let limits = formatter.limits();
            for part in &fitted {
                assert!(!part.is_oversized());
                assert!(part.char_count <= limits.max_chars);
                assert!(part.blocks.iter().all(|b| b.body_len() <= limits.max_entry_chars));
                assert!(part.payload.get("embeds").is_some());
            }
            let lines: usize = fitted
                .iter()
                .flat_map(|b| &b.blocks)
                .map(|b| b.body.lines().count())
                .sum();
            assert_eq!(lines, 400);
        }

        #[tokio::test]
        async fn sends_header_batches_footer_in_order() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&server)
                .await;

            let formatter = SlackFormatter::new();
            let block = FormattedBlock::new("", "line", 0, 1);
            let mut batch = Batch::from_blocks(vec![block]);
            batch.payload = formatter.batch_payload(&batch);
            let msg = message(Platform::Slack, vec![batch]);

            let sent = fast_client(0)
                .deliver(&msg, &formatter, &hook(&server))
                .await
                .unwrap();
            assert_eq!(sent, 3);

            let requests = server.received_requests().await.unwrap();
            let bodies: Vec<Value> = requests
                .iter()
                .map(|r| serde_json::from_slice(&r.body).unwrap())
                .collect();
            assert_eq!(bodies[0], json!({"content": "header"}));
            assert!(bodies[1].get("attachments").is_some());
            assert_eq!(bodies[2], json!({"content": "footer"}));
        }

        #[tokio::test]
        async fn stops_at_first_failure() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            let formatter = DiscordFormatter::new();
            let msg = message(Platform::Discord, vec![]);
            let err = fast_client(0)
                .deliver(&msg, &formatter, &hook(&server))
                .await
                .unwrap_err();
            assert!(matches!(err, ServerError::Delivery { .. }));
            assert_eq!(server.received_requests().await.unwrap().len(), 1);
        }
    }
}
