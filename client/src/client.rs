use crate::{events::Stream, ledger::Ledger, Error, Result};
use commonware_codec::{DecodeExt, Encode};
use commonware_cryptography::{ed25519::Signature, sha256::Digest};
use commonware_utils::hex;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tictactoe_types::{
    api::{Airdrop, Update},
    Account, Address, FeeSchedule, Transaction,
};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tracing::{debug, info};
use url::Url;

/// Timeout for connections and requests
const TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn join_hex_path(base: &Url, prefix: &str, bytes: &[u8]) -> Result<Url> {
    Ok(base.join(&format!("{prefix}/{}", hex(bytes)))?)
}

/// Retry policy for transient HTTP failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request (including the first attempt).
    pub max_attempts: usize,
    /// Initial backoff delay after the first retryable failure.
    pub initial_backoff: Duration,
    /// Maximum backoff delay between attempts.
    pub max_backoff: Duration,
    /// Whether non-idempotent requests (e.g., POST) may be retried.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            retry_non_idempotent: false,
        }
    }
}

/// Ledger client speaking to a simulator over HTTP and WebSocket.
#[derive(Clone)]
pub struct Client {
    pub base_url: Url,
    pub ws_url: Url,
    pub http_client: HttpClient,

    retry_policy: RetryPolicy,
}

impl Client {
    /// Create a new client
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;

        // Convert http(s) to ws(s) for WebSocket URL
        let ws_scheme = match base_url.scheme() {
            "http" => "ws",
            "https" => "wss",
            scheme => {
                return Err(Error::InvalidScheme(scheme.to_string()));
            }
        };

        let mut ws_url = base_url.clone();
        ws_url
            .set_scheme(ws_scheme)
            .map_err(|_| Error::InvalidScheme(ws_scheme.to_string()))?;

        let http_client = HttpClient::builder()
            .timeout(TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(60)) // Keep connections alive
            .tcp_keepalive(Duration::from_secs(30)) // TCP keepalive
            .build()?;

        Ok(Self {
            base_url,
            ws_url,
            http_client,
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Returns a copy of the current retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Returns a new client with the provided retry policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub(crate) async fn get_with_retry(&self, url: Url) -> Result<reqwest::Response> {
        self.send_with_retry(reqwest::Method::GET, || self.http_client.get(url.clone()))
            .await
    }

    pub(crate) async fn post_bytes_with_retry(
        &self,
        url: Url,
        body: Vec<u8>,
    ) -> Result<reqwest::Response> {
        self.send_with_retry(reqwest::Method::POST, || {
            self.http_client.post(url.clone()).body(body.clone())
        })
        .await
    }

    async fn send_with_retry(
        &self,
        method: reqwest::Method,
        make_request: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let max_attempts =
            if method == reqwest::Method::GET || self.retry_policy.retry_non_idempotent {
                self.retry_policy.max_attempts.max(1)
            } else {
                1
            };

        let mut attempt = 0usize;
        let mut backoff = self.retry_policy.initial_backoff;
        loop {
            attempt += 1;
            let result = make_request().send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) || attempt >= max_attempts {
                        return Ok(response);
                    }
                }
                Err(err) => {
                    if attempt >= max_attempts || !is_retryable_error(&err) {
                        return Err(Error::Reqwest(err));
                    }
                }
            }

            if backoff > Duration::ZERO {
                sleep(backoff).await;
                backoff = std::cmp::min(backoff.saturating_mul(2), self.retry_policy.max_backoff);
            }
        }
    }

    async fn decode_ok<T: DecodeExt<()>>(response: reqwest::Response) -> Result<T> {
        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::Failed(response.status()));
        }
        let buf = response.bytes().await?.to_vec();
        Ok(T::decode(buf.as_slice())?)
    }
}

impl Ledger for Client {
    async fn read_account(&self, address: &Address) -> Result<Option<Account>> {
        let url = join_hex_path(&self.base_url, "account", address.as_ref())?;
        let response = self.get_with_retry(url).await?;
        match response.status() {
            reqwest::StatusCode::OK => Ok(Some(Self::decode_ok(response).await?)),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Error::Failed(response.status())),
        }
    }

    async fn subscribe(&self, address: &Address) -> Result<Stream<Update>> {
        let ws_url = join_hex_path(&self.ws_url, "updates", address.as_ref())?;
        info!(%ws_url, "Connecting to updates WebSocket");

        let (ws_stream, _) = timeout(TIMEOUT, connect_async(ws_url.as_str()))
            .await
            .map_err(|_| Error::DialTimeout)??;
        info!("WebSocket connected");

        Ok(Stream::new(ws_stream))
    }

    async fn fee_schedule(&self) -> Result<FeeSchedule> {
        let url = self.base_url.join("fees")?;
        let response = self.get_with_retry(url).await?;
        Self::decode_ok(response).await
    }

    async fn submit(&self, transaction: &Transaction) -> Result<Signature> {
        let url = self.base_url.join("submit")?;
        debug!("Submitting to {}", url);
        let response = self
            .post_bytes_with_retry(url, transaction.encode().to_vec())
            .await?;
        match response.status() {
            reqwest::StatusCode::OK => Self::decode_ok(response).await,
            reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
                Err(Error::Rejected(response.text().await?))
            }
            status => Err(Error::Failed(status)),
        }
    }

    async fn request_funds(&self, address: &Address, lamports: u64) -> Result<Digest> {
        let url = self.base_url.join("airdrop")?;
        let request = Airdrop {
            address: *address,
            lamports,
        };
        let response = self
            .post_bytes_with_retry(url, request.encode().to_vec())
            .await?;
        Self::decode_ok(response).await
    }

    async fn confirm_funds(&self, id: &Digest) -> Result<bool> {
        let url = join_hex_path(&self.base_url, "airdrop", id.as_ref())?;
        let response = self.get_with_retry(url).await?;
        match response.status() {
            reqwest::StatusCode::OK => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::Failed(status)),
        }
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    use reqwest::StatusCode;
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::TestContext;
    use tictactoe_execution::mocks::create_account_keypair;
    use tictactoe_types::{program, system};

    #[tokio::test]
    async fn test_client_rejects_bad_scheme() {
        assert!(matches!(
            Client::new("ftp://localhost"),
            Err(Error::InvalidScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_client_retry_policy() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::ZERO,
            ..Default::default()
        };
        let client = Client::new("http://127.0.0.1:1").unwrap().with_retry_policy(policy);
        assert_eq!(client.retry_policy(), policy);

        // Nothing listens on port 1
        let (_, address) = create_account_keypair(1);
        let err = client.read_account(&address).await.unwrap_err();
        assert!(matches!(err, Error::Reqwest(_)));
        assert!(!err.is_rejected());
    }

    #[tokio::test]
    async fn test_client_ledger_operations() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();
        let (payer, payer_address) = create_account_keypair(1);

        assert_eq!(client.read_account(&payer_address).await.unwrap(), None);
        assert_eq!(client.balance(&payer_address).await.unwrap(), 0);

        // Airdrop
        let id = client.request_funds(&payer_address, 1_000_000).await.unwrap();
        assert!(client.confirm_funds(&id).await.unwrap());
        assert_eq!(client.balance(&payer_address).await.unwrap(), 1_000_000);

        // Submit
        let fees = client.fee_schedule().await.unwrap();
        assert_eq!(fees.fee_per_signature, ctx.simulator.fee_schedule().fee_per_signature);
        let (dashboard, dashboard_address) = create_account_keypair(2);
        let tx = Transaction::sign(
            fees.slot,
            vec![
                system::create_account(dashboard_address, 0, 255, program::ID),
                program::init_dashboard(program::ID, dashboard_address),
            ],
            &[&payer, &dashboard],
        );
        let signature = client.submit(&tx).await.unwrap();
        assert_eq!(Some(&signature), tx.signature());
        assert!(ctx.simulator.read_account(&dashboard_address).is_some());

        // Replays are rejected by the ledger, not the transport
        let err = client.submit(&tx).await.unwrap_err();
        assert!(err.is_rejected(), "{err}");
    }

    #[tokio::test]
    async fn test_client_subscribe() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();
        let (_, address) = create_account_keypair(1);

        let mut stream = client.subscribe(&address).await.unwrap();
        ctx.simulator.request_funds(address, 42);
        let update = stream.next().await.unwrap().unwrap();
        assert_eq!(update.address, address);
        assert_eq!(update.account.lamports, 42);
    }
}
