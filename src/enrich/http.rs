use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::EnrichmentConfig;

/// Longest single wait between two attempts.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Attempts after the first one, and the delay before the first retry (doubled each time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(cfg: &EnrichmentConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            initial_backoff_ms: cfg.initial_backoff_ms,
        }
    }

    /// Delay before retry `attempt` (1-based), doubling and capped at a minute.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        2u64.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.initial_backoff_ms.checked_mul(factor))
            .map_or(MAX_BACKOFF_MS, |ms| ms.min(MAX_BACKOFF_MS))
    }
}

/// Client shared by every provider; the timeout applies to each request.
pub fn build_client(cfg: &EnrichmentConfig) -> Result<Client> {
    Client::builder()
        .timeout(cfg.timeout())
        .user_agent(cfg.user_agent.clone())
        .gzip(true)
        .cookie_store(true)
        .build()
        .context("building HTTP client")
}

async fn get_text_core(client: &Client, url: &Url) -> Result<String> {
    debug!(%url, "GET");
    client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {url} failed"))?
        .error_for_status()
        .with_context(|| format!("non-success status from {url}"))?
        .text()
        .await
        .with_context(|| format!("reading body from {url}"))
}

pub async fn get_text_with_retry(client: &Client, url: &Url, policy: RetryPolicy) -> Result<String> {
    let mut attempts = 0;
    loop {
        match get_text_core(client, url).await {
            Ok(t) => return Ok(t),
            Err(e) if attempts < policy.max_retries => {
                attempts += 1;
                let backoff = policy.backoff_ms(attempts);
                warn!(%url, attempt = attempts, delay_ms = backoff, error = %e, "retrying");
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => {
                error!(%url, error = %e, "exhausted retries");
                return Err(e);
            }
        }
    }
}

pub async fn get_json_with_retry<T: DeserializeOwned>(
    client: &Client,
    url: &Url,
    policy: RetryPolicy,
) -> Result<T> {
    let body = get_text_with_retry(client, url, policy).await?;
    serde_json::from_str(&body).with_context(|| format!("decoding JSON from {url}"))
}

#[cfg(test)]
pub(crate) mod testserver {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };
    use url::Url;

    /// Serves the scripted `(status, body)` responses in order, one per
    /// connection, then repeats the last one. Returns the base URL and a hit counter.
    pub async fn serve(responses: Vec<(u16, String)>) -> (Url, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses
                    .get(n)
                    .or_else(|| responses.last())
                    .cloned()
                    .unwrap_or((404, String::new()));

                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-length: {}\r\ncontent-type: text/plain\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        let base = Url::parse(&format!("http://{addr}/")).expect("server url");
        (base, hits)
    }
}

#[cfg(test)]
mod tests {
    use super::testserver::serve;
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::Ordering;

    const FAST: RetryPolicy = RetryPolicy {
        max_retries: 2,
        initial_backoff_ms: 1,
    };

    #[tokio::test]
    async fn retries_until_success() -> Result<()> {
        let (base, hits) = serve(vec![
            (503, "busy".into()),
            (500, "oops".into()),
            (200, "hello".into()),
        ])
        .await;
        let body = get_text_with_retry(&Client::new(), &base, FAST).await?;
        assert_eq!(body, "hello");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (base, hits) = serve(vec![(500, "down".into())]).await;
        let err = get_text_with_retry(&Client::new(), &base, FAST).await;
        assert!(err.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        let policy = RetryPolicy {
            max_retries: 200,
            initial_backoff_ms: 500,
        };
        assert_eq!(policy.backoff_ms(1), 500);
        assert_eq!(policy.backoff_ms(3), 2_000);
        assert_eq!(policy.backoff_ms(64), MAX_BACKOFF_MS);
        assert_eq!(policy.backoff_ms(200), MAX_BACKOFF_MS);
    }

    #[tokio::test]
    async fn decodes_json() -> Result<()> {
        #[derive(Deserialize)]
        struct Payload {
            total: u32,
        }
        let (base, _) = serve(vec![(200, r#"{"total": 7}"#.into())]).await;
        let p: Payload = get_json_with_retry(&Client::new(), &base, FAST).await?;
        assert_eq!(p.total, 7);
        Ok(())
    }
}
