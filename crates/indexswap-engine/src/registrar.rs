//! Registration system gateway.
//!
//! The engine never talks to the registration portal directly. It goes
//! through a `RegistrationGateway`, which in production is an HTTP client for
//! the automation driver that holds the portal session.

use std::time::Duration;

use async_trait::async_trait;
use indexswap_core::OwnerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a registration gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The call failed but may succeed on a later cycle.
    #[error("transient gateway failure: {0}")]
    Transient(String),

    /// The call failed in a way retrying will not fix.
    #[error("fatal gateway failure: {0}")]
    Fatal(String),
}

impl GatewayError {
    /// Returns true if the failure should be retried on the next cycle.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The underlying reason, without the classification prefix.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(reason) | Self::Fatal(reason) => reason,
        }
    }
}

/// Trait for registration system access.
///
/// This trait abstracts the portal driver, allowing for scripted
/// implementations in tests.
#[async_trait]
pub trait RegistrationGateway: Send + Sync {
    /// Whether `index` currently has a free place.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Transient` for failures worth retrying and
    /// `GatewayError::Fatal` when the owner's portal session is unusable.
    async fn check_vacancy(&self, owner: &OwnerId, index: &str) -> Result<bool, GatewayError>;

    /// Swap `old_index` for `new_index`. Returns whether the swap went through.
    ///
    /// # Errors
    ///
    /// Same classification as [`RegistrationGateway::check_vacancy`].
    async fn perform_swap(
        &self,
        owner: &OwnerId,
        old_index: &str,
        new_index: &str,
    ) -> Result<bool, GatewayError>;
}

/// HTTP client for the registration driver service.
///
/// Status mapping:
/// - connect errors, timeouts, `429` and `5xx` are transient
/// - `401`/`403` are fatal (the portal session is gone)
/// - `404` on a vacancy check means the index is not offered
/// - any other `4xx` is fatal
#[derive(Debug, Clone)]
pub struct HttpRegistrationGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistrationGateway {
    /// Create a new gateway client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the driver service (e.g., "http://registrar:9000")
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self::with_client(client, base_url)
    }

    /// Create a new gateway client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Get the base URL of the driver service.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, GatewayError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| GatewayError::Fatal(format!("invalid registrar URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| GatewayError::Fatal("registrar URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn classify_transport(e: &reqwest::Error) -> GatewayError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        GatewayError::Transient(format!("registrar unreachable: {e}"))
    } else {
        GatewayError::Transient(format!("registrar request failed: {e}"))
    }
}

async fn classify_status(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let detail = response
        .json::<ErrorResponse>()
        .await
        .map_or_else(|_| format!("registrar returned status {status}"), |e| e.error);

    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        GatewayError::Transient(detail)
    } else {
        GatewayError::Fatal(detail)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct VacancyResponse {
    available: bool,
}

#[derive(Debug, Serialize)]
struct SwapRequest<'a> {
    old_index: &'a str,
    new_index: &'a str,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    swapped: bool,
}

#[async_trait]
impl RegistrationGateway for HttpRegistrationGateway {
    async fn check_vacancy(&self, owner: &OwnerId, index: &str) -> Result<bool, GatewayError> {
        let owner_hex = owner.to_hex();
        let url = self.url(&["v1", "owners", &owner_hex, "indexes", index, "vacancy"])?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(owner = %owner, index, "Index not offered by registrar");
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(classify_status(response).await);
        }

        let body: VacancyResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("Failed to parse response: {e}")))?;
        Ok(body.available)
    }

    async fn perform_swap(
        &self,
        owner: &OwnerId,
        old_index: &str,
        new_index: &str,
    ) -> Result<bool, GatewayError> {
        let owner_hex = owner.to_hex();
        let url = self.url(&["v1", "owners", &owner_hex, "swaps"])?;

        let response = self
            .client
            .post(url)
            .json(&SwapRequest {
                old_index,
                new_index,
            })
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if !response.status().is_success() {
            let error = classify_status(response).await;
            tracing::error!(
                owner = %owner,
                old_index,
                new_index,
                error = %error,
                "Swap request failed"
            );
            return Err(error);
        }

        let body: SwapResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("Failed to parse response: {e}")))?;
        Ok(body.swapped)
    }
}

/// A no-op gateway for running without a registration driver.
///
/// Every index reports no vacancy, so sessions run until their deadline.
#[derive(Debug, Clone, Default)]
pub struct NoopRegistrationGateway;

impl NoopRegistrationGateway {
    /// Create a new no-op gateway.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RegistrationGateway for NoopRegistrationGateway {
    async fn check_vacancy(&self, owner: &OwnerId, index: &str) -> Result<bool, GatewayError> {
        tracing::warn!(
            owner = %owner,
            index,
            "NoopRegistrationGateway: check_vacancy called but no registrar configured"
        );
        Ok(false)
    }

    async fn perform_swap(
        &self,
        owner: &OwnerId,
        old_index: &str,
        new_index: &str,
    ) -> Result<bool, GatewayError> {
        tracing::warn!(
            owner = %owner,
            old_index,
            new_index,
            "NoopRegistrationGateway: perform_swap called but no registrar configured"
        );
        Ok(false)
    }
}

/// Scripted gateway for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    use async_trait::async_trait;
    use indexswap_core::OwnerId;
    use parking_lot::Mutex;

    use super::{GatewayError, RegistrationGateway};

    /// A call observed by [`ScriptedGateway`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum GatewayCall {
        /// `check_vacancy(index)`.
        CheckVacancy(String),
        /// `perform_swap(old, new)`.
        PerformSwap(String, String),
    }

    type Reply = Result<bool, GatewayError>;

    /// Gateway whose answers are queued per index.
    ///
    /// Each call pops the next queued reply for its index (or swap pair);
    /// once a queue is empty the default reply is used. Vacancy defaults to
    /// `Ok(false)`, swaps default to `Ok(true)`.
    #[derive(Debug)]
    pub struct ScriptedGateway {
        vacancy: Mutex<HashMap<String, VecDeque<Reply>>>,
        swaps: Mutex<HashMap<(String, String), VecDeque<Reply>>>,
        default_vacancy: Mutex<Reply>,
        swap_delay: Mutex<Duration>,
        calls: Mutex<Vec<GatewayCall>>,
    }

    impl Default for ScriptedGateway {
        fn default() -> Self {
            Self {
                vacancy: Mutex::new(HashMap::new()),
                swaps: Mutex::new(HashMap::new()),
                default_vacancy: Mutex::new(Ok(false)),
                swap_delay: Mutex::new(Duration::ZERO),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ScriptedGateway {
        /// Create a gateway where nothing is ever vacant.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue vacancy replies for `index`, one per call.
        pub fn script_vacancy(&self, index: &str, replies: impl IntoIterator<Item = Reply>) {
            self.vacancy
                .lock()
                .entry(index.to_string())
                .or_default()
                .extend(replies);
        }

        /// Queue swap replies for the `old -> new` pair, one per call.
        pub fn script_swap(&self, old: &str, new: &str, replies: impl IntoIterator<Item = Reply>) {
            self.swaps
                .lock()
                .entry((old.to_string(), new.to_string()))
                .or_default()
                .extend(replies);
        }

        /// Reply used once an index has no queued vacancy replies.
        pub fn set_default_vacancy(&self, reply: Reply) {
            *self.default_vacancy.lock() = reply;
        }

        /// Make every `perform_swap` take `delay` before replying.
        pub fn set_swap_delay(&self, delay: Duration) {
            *self.swap_delay.lock() = delay;
        }

        /// Every call made so far, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<GatewayCall> {
            self.calls.lock().clone()
        }

        /// Number of vacancy checks made for `index`.
        #[must_use]
        pub fn vacancy_checks(&self, index: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, GatewayCall::CheckVacancy(i) if i == index))
                .count()
        }
    }

    #[async_trait]
    impl RegistrationGateway for ScriptedGateway {
        async fn check_vacancy(&self, _owner: &OwnerId, index: &str) -> Reply {
            self.calls
                .lock()
                .push(GatewayCall::CheckVacancy(index.to_string()));
            let queued = self
                .vacancy
                .lock()
                .get_mut(index)
                .and_then(VecDeque::pop_front);
            queued.unwrap_or_else(|| self.default_vacancy.lock().clone())
        }

        async fn perform_swap(&self, _owner: &OwnerId, old_index: &str, new_index: &str) -> Reply {
            self.calls.lock().push(GatewayCall::PerformSwap(
                old_index.to_string(),
                new_index.to_string(),
            ));
            let delay = *self.swap_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let key = (old_index.to_string(), new_index.to_string());
            self.swaps
                .lock()
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn owner() -> OwnerId {
        OwnerId::from_bytes([0x11; 32])
    }

    fn owner_path(suffix: &str) -> String {
        format!("/v1/owners/{}/{suffix}", owner().to_hex())
    }

    #[test]
    fn http_gateway_creation() {
        let gateway = HttpRegistrationGateway::new("http://localhost:9000");
        assert_eq!(gateway.base_url(), "http://localhost:9000");
    }

    #[tokio::test]
    async fn vacancy_parses_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(owner_path("indexes/80275/vacancy")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"available": true})),
            )
            .mount(&server)
            .await;

        let gateway = HttpRegistrationGateway::new(server.uri());
        assert!(gateway.check_vacancy(&owner(), "80275").await.unwrap());
    }

    #[tokio::test]
    async fn vacancy_not_found_means_no_vacancy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gateway = HttpRegistrationGateway::new(server.uri());
        assert!(!gateway.check_vacancy(&owner(), "99999").await.unwrap());
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let gateway = HttpRegistrationGateway::new(server.uri());
        let err = gateway.check_vacancy(&owner(), "80275").await.unwrap_err();
        assert!(err.is_retriable(), "{err}");
    }

    #[tokio::test]
    async fn unauthorized_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": "portal session expired"})),
            )
            .mount(&server)
            .await;

        let gateway = HttpRegistrationGateway::new(server.uri());
        let err = gateway
            .perform_swap(&owner(), "80271", "80275")
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Fatal("portal session expired".to_string()));
    }

    #[tokio::test]
    async fn swap_sends_indexes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(owner_path("swaps")))
            .and(body_json(
                serde_json::json!({"old_index": "80271", "new_index": "80275"}),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"swapped": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpRegistrationGateway::new(server.uri());
        assert!(gateway
            .perform_swap(&owner(), "80271", "80275")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unreachable_driver_is_transient() {
        // Nothing listens on the discard port.
        let gateway = HttpRegistrationGateway::new("http://127.0.0.1:9");
        let err = gateway.check_vacancy(&owner(), "80275").await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn noop_gateway_never_finds_vacancy() {
        let gateway = NoopRegistrationGateway::new();
        assert!(!gateway.check_vacancy(&owner(), "1").await.unwrap());
        assert!(!gateway.perform_swap(&owner(), "1", "2").await.unwrap());
    }

    #[tokio::test]
    async fn scripted_gateway_pops_in_order() {
        let gateway = mock::ScriptedGateway::new();
        gateway.script_vacancy("1", [Ok(false), Err(GatewayError::Transient("x".into()))]);

        assert_eq!(gateway.check_vacancy(&owner(), "1").await, Ok(false));
        assert!(gateway.check_vacancy(&owner(), "1").await.is_err());
        assert_eq!(gateway.check_vacancy(&owner(), "1").await, Ok(false));
        assert_eq!(gateway.vacancy_checks("1"), 3);
    }
}
