// Advisory only: egress IP discovery and allow-list recommendations.

use crate::model::AgentInfo;
use crate::transport::TransportTier;
use futures::future::{select_ok, BoxFuture};
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

pub const CLOUD_METADATA_URL: &str = "http://169.254.169.254/latest/meta-data/public-ipv4";
pub const PUBLIC_IP_SOURCES: [&str; 4] = [
    "https://api.ipify.org",
    "https://httpbin.org/ip",
    "https://icanhazip.com",
    "https://ipinfo.io/ip",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IpSource {
    CloudMetadata,
    PublicService(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EgressIp {
    pub ip: IpAddr,
    pub source: IpSource,
}

pub struct IpProbe {
    http: reqwest::Client,
    metadata_url: Option<String>,
    sources: Vec<String>,
    metadata_timeout: Duration,
    source_timeout: Duration,
}

impl Default for IpProbe {
    fn default() -> Self {
        Self::new(
            Some(CLOUD_METADATA_URL),
            &PUBLIC_IP_SOURCES,
            Duration::from_secs(2),
            Duration::from_secs(5),
        )
    }
}

impl IpProbe {
    pub fn new(
        metadata_url: Option<&str>,
        sources: &[&str],
        metadata_timeout: Duration,
        source_timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            metadata_url: metadata_url.map(str::to_string),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            metadata_timeout,
            source_timeout,
        }
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<IpAddr, String> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body = response.text().await.map_err(|e| e.to_string())?;
        parse_ip(&body).ok_or_else(|| format!("no IP address in reply from {url}"))
    }

    // Cloud metadata first, then whichever public service answers first.
    pub async fn discover(&self) -> Option<EgressIp> {
        if let Some(url) = &self.metadata_url {
            match self.fetch(url, self.metadata_timeout).await {
                Ok(ip) => {
                    info!(%ip, "egress IP from cloud metadata");
                    return Some(EgressIp {
                        ip,
                        source: IpSource::CloudMetadata,
                    });
                }
                Err(e) => debug!(error = %e, "cloud metadata unavailable"),
            }
        }

        if self.sources.is_empty() {
            return None;
        }
        let lookups: Vec<BoxFuture<'_, Result<EgressIp, String>>> = self
            .sources
            .iter()
            .map(|source| {
                let lookup: BoxFuture<'_, Result<EgressIp, String>> = Box::pin(async move {
                    let ip = self.fetch(source, self.source_timeout).await?;
                    Ok(EgressIp {
                        ip,
                        source: IpSource::PublicService(source.clone()),
                    })
                });
                lookup
            })
            .collect();
        match select_ok(lookups).await {
            Ok((found, _)) => {
                info!(ip = %found.ip, "egress IP from public service");
                Some(found)
            }
            Err(e) => {
                debug!(error = %e, "no public IP service answered");
                None
            }
        }
    }
}

// Accepts a bare address or httpbin's `{"origin": "a, b"}`.
pub fn parse_ip(body: &str) -> Option<IpAddr> {
    let body = body.trim();
    if let Ok(ip) = body.parse() {
        return Some(ip);
    }
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("origin")?
        .as_str()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthProbe {
    pub authenticated: bool,
    pub tier: Option<TransportTier>,
    pub agent: Option<AgentInfo>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub current_ip: Option<IpAddr>,
    pub expected_ip: Option<IpAddr>,
    pub ip_source: Option<IpSource>,
    pub is_whitelisted: bool,
    pub authenticated: bool,
    pub tier: Option<TransportTier>,
    pub agent: Option<AgentInfo>,
    pub error: Option<String>,
    pub recommendations: Vec<String>,
}

impl ConnectivityReport {
    pub fn assemble(
        egress: Option<EgressIp>,
        expected_ip: Option<IpAddr>,
        auth: AuthProbe,
        proxy_configured: bool,
    ) -> Self {
        let current_ip = egress.as_ref().map(|e| e.ip);
        let mut report = Self {
            current_ip,
            expected_ip,
            ip_source: egress.map(|e| e.source),
            is_whitelisted: current_ip.is_some() && current_ip == expected_ip,
            authenticated: auth.authenticated,
            tier: auth.tier,
            agent: auth.agent,
            error: auth.error,
            recommendations: Vec::new(),
        };
        report.recommendations = recommend(&report, proxy_configured);
        report
    }
}

fn recommend(report: &ConnectivityReport, proxy_configured: bool) -> Vec<String> {
    let mut advice = Vec::new();

    match (report.current_ip, report.expected_ip) {
        (None, _) => advice.push(
            "Could not determine the egress IP; check outbound connectivity from this host"
                .to_string(),
        ),
        (Some(_), None) => advice.push(
            "Set TOURPLAN_WHITELISTED_IP to the partner's allow-listed address to verify the egress IP"
                .to_string(),
        ),
        (Some(current), Some(expected)) if current != expected => {
            if report.ip_source == Some(IpSource::CloudMetadata) {
                advice.push(format!(
                    "Associate the allow-listed IP {expected} with this cloud instance (current public IP {current})"
                ));
            } else {
                advice.push(format!("Ask the partner to add IP {current} to the allow-list"));
            }
            if !proxy_configured {
                advice.push(format!(
                    "Or set USE_TOURPLAN_PROXY=true and TOURPLAN_PROXY_URL to forward through a host that egresses from {expected}"
                ));
            }
        }
        _ => {}
    }

    if report.tier == Some(TransportTier::Mock) {
        advice.push("Partner calls are currently answered with offline mock data".to_string());
    }
    if !report.authenticated {
        if let Some(error) = &report.error {
            advice.push(format!(
                "Partner authentication failed ({error}); verify TOURPLAN_AGENT_ID and TOURPLAN_PASSWORD"
            ));
        }
    }

    if advice.is_empty() {
        advice.push(
            "Egress IP is allow-listed and the partner accepted the agent credentials".to_string(),
        );
    }
    advice
}
