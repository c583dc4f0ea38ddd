use crate::availability::SentinelMap;
use crate::cache::CacheTtl;
use crate::error::ConfigError;
use crate::request::DEFAULT_DTD;
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub agent_id: String,
    password: String,
}

impl Credentials {
    pub fn new(agent_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            password: password.into(),
        }
    }

    pub fn offline() -> Self {
        Self::new("OFFLINE", "OFFLINE")
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

// Never print the password
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("agent_id", &self.agent_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub url: Url,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEndpoint {
    pub endpoint: Url,
    pub credentials: Credentials,
    pub proxy: Option<ProxySettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineReason {
    DemoMode,
    NoCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerMode {
    Live(LiveEndpoint),
    Offline(OfflineReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub call: Duration,
    pub probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            call: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            probe: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Remote { url: Url, token: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerConfig {
    pub mode: PartnerMode,
    pub dtd: String,
    pub timeouts: Timeouts,
    pub mock_fallback: bool,
    pub whitelisted_ip: Option<IpAddr>,
    pub sentinels: SentinelMap,
    pub cache: CacheBackend,
    pub cache_ttl: CacheTtl,
}

impl PartnerConfig {
    // Offline configuration: every call is answered by the mock tier.
    pub fn offline() -> Self {
        Self {
            mode: PartnerMode::Offline(OfflineReason::NoCredentials),
            dtd: DEFAULT_DTD.to_string(),
            timeouts: Timeouts::default(),
            mock_fallback: true,
            whitelisted_ip: None,
            sentinels: SentinelMap::default(),
            cache: CacheBackend::Memory,
            cache_ttl: CacheTtl::default(),
        }
    }

    // Loads `.env` if present, then resolves from the process environment.
    //
    // | Env Var                                              | Default                    |
    // |------------------------------------------------------|----------------------------|
    // | `TOURPLAN_API_URL` / `TOURPLAN_ENDPOINT`             | none (offline)             |
    // | `TOURPLAN_AGENT_ID` / `TOURPLAN_AGENTID`             | none (offline)             |
    // | `TOURPLAN_PASSWORD` / `TOURPLAN_AGENTPASSWORD`       | none (offline)             |
    // | `USE_TOURPLAN_PROXY`                                 | `false`                    |
    // | `TOURPLAN_PROXY_URL`                                 | none                       |
    // | `TOURPLAN_PROXY_API_KEY`                             | none                       |
    // | `TOURPLAN_DEMO_MODE`                                 | `false`                    |
    // | `TOURPLAN_MOCK_FALLBACK`                             | `true`                     |
    // | `TOURPLAN_DTD`                                       | `hostConnect_5_05_000.dtd` |
    // | `TOURPLAN_TIMEOUT_MS`                                | `30000`                    |
    // | `TOURPLAN_PROBE_TIMEOUT_MS`                          | `2000`                     |
    // | `TOURPLAN_WHITELISTED_IP`                            | none                       |
    // | `TOURPLAN_AVAILABILITY_CODES`                        | `-1=closed,-2=free_sell,-3=on_request,0=closed` |
    // | `KV_REST_API_URL` / `KV_REST_API_TOKEN`              | none (in-process cache)    |
    // | `CACHE_SEARCH_TTL_SECS` / `CACHE_AVAILABILITY_TTL_SECS` / `CACHE_PRODUCT_TTL_SECS` | `300` / `300` / `600` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::resolve(|name| std::env::var(name).ok())
    }

    pub fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let demo = env.flag("TOURPLAN_DEMO_MODE", false)?;
        let mode = if demo {
            PartnerMode::Offline(OfflineReason::DemoMode)
        } else {
            env.live_mode()?
        };

        let timeouts = Timeouts {
            call: env.millis("TOURPLAN_TIMEOUT_MS", DEFAULT_CALL_TIMEOUT_MS)?,
            probe: env.millis("TOURPLAN_PROBE_TIMEOUT_MS", DEFAULT_PROBE_TIMEOUT_MS)?,
        };

        let whitelisted_ip = match env.get(&["TOURPLAN_WHITELISTED_IP"]) {
            Some(raw) => Some(raw.parse::<IpAddr>().map_err(|_| ConfigError::Invalid {
                name: "TOURPLAN_WHITELISTED_IP",
                reason: format!("{raw:?} is not an IP address"),
            })?),
            None => None,
        };

        let sentinels = match env.get(&["TOURPLAN_AVAILABILITY_CODES"]) {
            Some(raw) => raw.parse::<SentinelMap>().map_err(|e| {
                ConfigError::Invalid {
                    name: "TOURPLAN_AVAILABILITY_CODES",
                    reason: e.to_string(),
                }
            })?,
            None => SentinelMap::default(),
        };

        let cache = match (env.get(&["KV_REST_API_URL"]), env.get(&["KV_REST_API_TOKEN"])) {
            (Some(url), Some(token)) => CacheBackend::Remote {
                url: parse_url("KV_REST_API_URL", &url)?,
                token,
            },
            (None, None) => CacheBackend::Memory,
            (Some(_), None) => return Err(ConfigError::Missing("KV_REST_API_TOKEN")),
            (None, Some(_)) => return Err(ConfigError::Missing("KV_REST_API_URL")),
        };

        let defaults = CacheTtl::default();
        let cache_ttl = CacheTtl {
            search: env.secs("CACHE_SEARCH_TTL_SECS", defaults.search)?,
            availability: env.secs("CACHE_AVAILABILITY_TTL_SECS", defaults.availability)?,
            product: env.secs("CACHE_PRODUCT_TTL_SECS", defaults.product)?,
        };

        let config = Self {
            mode,
            dtd: env
                .get(&["TOURPLAN_DTD"])
                .unwrap_or_else(|| DEFAULT_DTD.to_string()),
            timeouts,
            mock_fallback: env.flag("TOURPLAN_MOCK_FALLBACK", true)?,
            whitelisted_ip,
            sentinels,
            cache,
            cache_ttl,
        };
        info!(
            mode = config.mode_label(),
            proxy = config.proxy().is_some(),
            remote_cache = matches!(config.cache, CacheBackend::Remote { .. }),
            "partner configuration resolved"
        );
        Ok(config)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match &self.mode {
            PartnerMode::Live(live) => Some(&live.credentials),
            PartnerMode::Offline(_) => None,
        }
    }

    pub fn proxy(&self) -> Option<&ProxySettings> {
        match &self.mode {
            PartnerMode::Live(live) => live.proxy.as_ref(),
            PartnerMode::Offline(_) => None,
        }
    }

    fn mode_label(&self) -> &'static str {
        match self.mode {
            PartnerMode::Live(_) => "live",
            PartnerMode::Offline(OfflineReason::DemoMode) => "demo",
            PartnerMode::Offline(OfflineReason::NoCredentials) => "offline",
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, names: &[&'static str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| (self.0)(*name))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }

    fn flag(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.get(&[name]) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                reason: format!("{raw:?} is not a boolean"),
            }),
        }
    }

    fn number(&self, name: &'static str, default: u64) -> Result<u64, ConfigError> {
        match self.get(&[name]) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name,
                reason: format!("{raw:?} is not a non-negative integer"),
            }),
            None => Ok(default),
        }
    }

    fn millis(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let ms = self.number(name, default)?;
        if ms == 0 {
            return Err(ConfigError::Invalid {
                name,
                reason: "timeout must be positive".into(),
            });
        }
        Ok(Duration::from_millis(ms))
    }

    fn secs(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.number(name, default.as_secs()).map(Duration::from_secs)
    }

    fn live_mode(&self) -> Result<PartnerMode, ConfigError> {
        let endpoint = self.get(&["TOURPLAN_API_URL", "TOURPLAN_ENDPOINT"]);
        let agent_id = self.get(&["TOURPLAN_AGENT_ID", "TOURPLAN_AGENTID"]);
        let password = self.get(&["TOURPLAN_PASSWORD", "TOURPLAN_AGENTPASSWORD"]);

        let (endpoint, agent_id, password) = match (endpoint, agent_id, password) {
            (None, None, None) => return Ok(PartnerMode::Offline(OfflineReason::NoCredentials)),
            (Some(e), Some(a), Some(p)) => (e, a, p),
            (None, _, _) => return Err(ConfigError::Missing("TOURPLAN_API_URL")),
            (_, None, _) => return Err(ConfigError::Missing("TOURPLAN_AGENT_ID")),
            (_, _, None) => return Err(ConfigError::Missing("TOURPLAN_PASSWORD")),
        };

        let proxy = if self.flag("USE_TOURPLAN_PROXY", false)? {
            let url = self
                .get(&["TOURPLAN_PROXY_URL"])
                .ok_or(ConfigError::Missing("TOURPLAN_PROXY_URL"))?;
            Some(ProxySettings {
                url: parse_url("TOURPLAN_PROXY_URL", &url)?,
                api_key: self.get(&["TOURPLAN_PROXY_API_KEY"]),
            })
        } else {
            None
        };

        Ok(PartnerMode::Live(LiveEndpoint {
            endpoint: parse_url("TOURPLAN_API_URL", &endpoint)?,
            credentials: Credentials::new(agent_id, password),
            proxy,
        }))
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}
