// Direct endpoint, then proxy, then mock. Only connect and timeout failures
// move a call down a tier; an HTTP status is returned as the answer.

use crate::config::{OfflineReason, PartnerConfig, PartnerMode, ProxySettings, Timeouts};
use crate::error::{truncate, ConfigError, Error, Result};
use crate::mock::MockPartner;
use crate::request::{Operation, PreparedRequest};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportTier {
    Direct,
    Proxied,
    Mock,
}

impl TransportTier {
    pub fn is_live(self) -> bool {
        !matches!(self, TransportTier::Mock)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fetched<T> {
    pub data: T,
    pub tier: TransportTier,
}

impl<T> Fetched<T> {
    pub fn new(data: T, tier: TransportTier) -> Self {
        Self { data, tier }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            tier: self.tier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub tier: TransportTier,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else if err.is_connect() || err.is_request() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }

    // The partner never answered
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout(_))
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: &PreparedRequest) -> Result<TransportReply>;
}

struct LiveTarget {
    endpoint: Url,
    proxy: Option<ProxySettings>,
}

pub struct HttpTransport {
    http: reqwest::Client,
    live: Option<LiveTarget>,
    offline_reason: Option<OfflineReason>,
    timeouts: Timeouts,
    mock_fallback: bool,
    mock: MockPartner,
}

impl HttpTransport {
    pub fn new(config: &PartnerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hostconnect-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "http client",
                reason: e.to_string(),
            })?;
        let (live, offline_reason) = match &config.mode {
            PartnerMode::Live(live) => (
                Some(LiveTarget {
                    endpoint: live.endpoint.clone(),
                    proxy: live.proxy.clone(),
                }),
                None,
            ),
            PartnerMode::Offline(reason) => (None, Some(*reason)),
        };
        Ok(Self {
            http,
            live,
            offline_reason,
            timeouts: config.timeouts,
            mock_fallback: config.mock_fallback,
            mock: MockPartner::new(),
        })
    }

    fn timeout_for(&self, request: &PreparedRequest) -> Duration {
        if request.operation.is_probe() {
            self.timeouts.probe
        } else {
            self.timeouts.call
        }
    }

    fn mock_reply(&self, request: &PreparedRequest) -> TransportReply {
        TransportReply {
            tier: TransportTier::Mock,
            body: self.mock.reply(request),
        }
    }

    async fn post(
        &self,
        url: &Url,
        request: &PreparedRequest,
        timeout: Duration,
        api_key: Option<&str>,
    ) -> Result<String, TransportError> {
        let mut builder = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .header(ACCEPT, "text/xml, application/xml")
            .timeout(timeout)
            .body(request.body.clone());
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200).to_string(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<TransportReply> {
        let operation = request.operation.element();
        let Some(live) = &self.live else {
            info!(operation, reason = ?self.offline_reason, tier = "mock", "serving offline reply");
            return Ok(self.mock_reply(request));
        };
        let timeout = self.timeout_for(request);

        let direct_failure = match self.post(&live.endpoint, request, timeout, None).await {
            Ok(body) => {
                info!(operation, tier = "direct", "partner call succeeded");
                return Ok(TransportReply {
                    tier: TransportTier::Direct,
                    body,
                });
            }
            Err(e) if e.is_fallback_eligible() => e,
            Err(e) => {
                warn!(operation, tier = "direct", error = %e, "partner rejected call");
                return Err(Error::Network(format!("direct: {e}")));
            }
        };
        warn!(operation, tier = "direct", error = %direct_failure, "partner unreachable");

        let mut failures = format!("direct: {direct_failure}");
        if let Some(proxy) = &live.proxy {
            match self
                .post(&proxy.url, request, timeout, proxy.api_key.as_deref())
                .await
            {
                Ok(body) => {
                    info!(operation, tier = "proxied", "partner call succeeded via proxy");
                    return Ok(TransportReply {
                        tier: TransportTier::Proxied,
                        body,
                    });
                }
                Err(e) if e.is_fallback_eligible() => {
                    warn!(operation, tier = "proxied", error = %e, "proxy unreachable");
                    failures.push_str(&format!("; proxied: {e}"));
                }
                Err(e) => {
                    warn!(operation, tier = "proxied", error = %e, "proxy rejected call");
                    return Err(Error::Network(format!("proxied: {e}")));
                }
            }
        }

        // Live bookings never fall back to the mock tier
        if request.operation == Operation::Booking {
            error!(operation, failures = %failures, "booking failed on every live tier");
            return Err(Error::Network(failures));
        }
        if self.mock_fallback {
            warn!(operation, tier = "mock", "live tiers exhausted, serving offline reply");
            return Ok(self.mock_reply(request));
        }
        error!(operation, failures = %failures, "partner call failed on every tier");
        Err(Error::Network(failures))
    }
}
