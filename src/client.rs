// Every operation: render, consult the cache, send, parse, cache live results.

use crate::availability::{AvailabilityDecoder, AvailabilityPolicy, SentinelMap};
use crate::cache::{CacheStatsReport, Fingerprint, KvStore, MemoryStore, ResponseCache, UpstashStore};
use crate::calendar::CalendarDate;
use crate::config::{CacheBackend, Credentials, PartnerConfig};
use crate::diagnostics::{AuthProbe, ConnectivityReport, IpProbe};
use crate::error::{Error, PartnerErrorCode, Result};
use crate::model::{
    AvailabilityCalendar, BookingConfirmation, BookingRequest, ButtonDetails, ButtonName,
    CalendarDay, Occupancy, Product, SearchCriteria,
};
use crate::request::RequestBuilder;
use crate::response::ResponseParser;
use crate::transport::{Fetched, HttpTransport, Transport, TransportTier};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// Degraded form for storefront pages: never an error, possibly empty
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub tier: Option<TransportTier>,
    pub error: Option<String>,
}

impl<T> Listing<T> {
    fn from_result(result: Result<Fetched<Vec<T>>>) -> Self {
        match result {
            Ok(fetched) => Listing {
                items: fetched.data,
                tier: Some(fetched.tier),
                error: None,
            },
            Err(e) => Listing {
                items: Vec::new(),
                tier: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

pub struct HostConnectClient {
    builder: RequestBuilder,
    parser: ResponseParser,
    decoder: AvailabilityDecoder,
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    whitelisted_ip: Option<IpAddr>,
    proxy_configured: bool,
}

impl HostConnectClient {
    pub fn new(config: &PartnerConfig, transport: Arc<dyn Transport>, store: Arc<dyn KvStore>) -> Self {
        let credentials = config
            .credentials()
            .cloned()
            .unwrap_or_else(Credentials::offline);
        Self {
            builder: RequestBuilder::new(credentials, config.dtd.clone()),
            parser: ResponseParser::new(),
            decoder: AvailabilityDecoder::new(config.sentinels.clone()),
            transport,
            cache: ResponseCache::new(store, config.cache_ttl),
            whitelisted_ip: config.whitelisted_ip,
            proxy_configured: config.proxy().is_some(),
        }
    }

    pub fn from_config(config: &PartnerConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        let store: Arc<dyn KvStore> = match &config.cache {
            CacheBackend::Memory => Arc::new(MemoryStore::new()),
            CacheBackend::Remote { url, token } => Arc::new(UpstashStore::new(
                url.clone(),
                token.clone(),
                config.timeouts.probe,
            )),
        };
        Ok(Self::new(config, transport, store))
    }

    pub async fn search(&self, criteria: &SearchCriteria) -> Result<Fetched<Vec<Product>>> {
        let request = self.builder.search(criteria)?;
        let key = Fingerprint::search(criteria);
        if let Some(hit) = self.cache.get::<Fetched<Vec<Product>>>(&key).await {
            return Ok(hit);
        }

        let reply = self.transport.send(&request).await?;
        let mut products = self.parser.parse_options(&reply.body)?;
        if let Some(level) = criteria
            .service_level
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            let level = level.to_lowercase();
            products.retain(|p| {
                p.category
                    .as_deref()
                    .map_or(false, |c| c.to_lowercase().contains(&level))
            });
        }
        info!(
            button = criteria.button.as_str(),
            results = products.len(),
            tier = ?reply.tier,
            "search completed"
        );

        let fetched = Fetched::new(products, reply.tier);
        self.remember(&key, &fetched, self.cache.ttl().search).await;
        Ok(fetched)
    }

    pub async fn get_availability(
        &self,
        code: &str,
        from: CalendarDate,
        to: CalendarDate,
        occupancy: &Occupancy,
    ) -> Result<Fetched<AvailabilityCalendar>> {
        let request = self.builder.pricing(code, from, to, occupancy)?;
        let key = Fingerprint::availability(code, from, to, occupancy);
        if let Some(hit) = self.cache.get::<Fetched<AvailabilityCalendar>>(&key).await {
            return Ok(hit);
        }

        let reply = self.transport.send(&request).await?;
        let products = self.parser.parse_options(&reply.body)?;
        let product = pick(products, code)?;
        let calendar = self.decoder.calendar(&product, from, to)?;
        debug!(
            product = %product.code,
            bookable = calendar.bookable_dates().count(),
            "availability decoded"
        );

        let fetched = Fetched::new(calendar, reply.tier);
        self.remember(&key, &fetched, self.cache.ttl().availability).await;
        Ok(fetched)
    }

    pub async fn get_product_detail(&self, code: &str) -> Result<Fetched<Product>> {
        let request = self.builder.product_detail(code)?;
        let key = Fingerprint::product(code);
        if let Some(hit) = self.cache.get::<Fetched<Product>>(&key).await {
            return Ok(hit);
        }

        let reply = self.transport.send(&request).await?;
        let product = pick(self.parser.parse_options(&reply.body)?, code)?;
        let fetched = Fetched::new(product, reply.tier);
        self.remember(&key, &fetched, self.cache.ttl().product).await;
        Ok(fetched)
    }

    pub async fn get_destinations(&self, button: &ButtonName) -> Result<Fetched<ButtonDetails>> {
        let request = self.builder.button_details(button, None)?;
        let key = Fingerprint::destinations(button);
        if let Some(hit) = self.cache.get::<Fetched<ButtonDetails>>(&key).await {
            return Ok(hit);
        }

        let reply = self.transport.send(&request).await?;
        let details = self.parser.parse_button_details(&reply.body)?;
        debug!(
            button = button.as_str(),
            localities = details.localities.len(),
            "destinations loaded"
        );
        let fetched = Fetched::new(details, reply.tier);
        self.remember(&key, &fetched, self.cache.ttl().product).await;
        Ok(fetched)
    }

    // Never cached
    pub async fn create_booking(&self, booking: &BookingRequest) -> Result<Fetched<BookingConfirmation>> {
        let request = self.builder.booking(booking)?;
        let reply = self.transport.send(&request).await?;
        let confirmation = self.parser.parse_booking(&reply.body)?;
        info!(
            booking_id = %confirmation.booking_id,
            status = %confirmation.status,
            tier = ?reply.tier,
            "booking placed"
        );
        if !reply.tier.is_live() {
            warn!(booking_id = %confirmation.booking_id, "booking was answered by the offline partner");
        }
        Ok(Fetched::new(confirmation, reply.tier))
    }

    pub async fn search_listing(&self, criteria: &SearchCriteria) -> Listing<Product> {
        let result = self.search(criteria).await;
        if let Err(e) = &result {
            warn!(error = %e, "search degraded to an empty listing");
        }
        Listing::from_result(result)
    }

    pub async fn availability_listing(
        &self,
        code: &str,
        from: CalendarDate,
        to: CalendarDate,
        occupancy: &Occupancy,
    ) -> Listing<CalendarDay> {
        let result = self
            .get_availability(code, from, to, occupancy)
            .await
            .map(|fetched| fetched.map(AvailabilityCalendar::into_days));
        if let Err(e) = &result {
            warn!(product = code, error = %e, "availability degraded to an empty listing");
        }
        Listing::from_result(result)
    }

    pub async fn check_connectivity(&self, probe: &IpProbe) -> ConnectivityReport {
        let (egress, auth) = tokio::join!(probe.discover(), self.probe_auth());
        let report =
            ConnectivityReport::assemble(egress, self.whitelisted_ip, auth, self.proxy_configured);
        info!(
            current_ip = ?report.current_ip,
            whitelisted = report.is_whitelisted,
            authenticated = report.authenticated,
            "connectivity checked"
        );
        report
    }

    async fn probe_auth(&self) -> AuthProbe {
        let outcome = match self.builder.agent_info() {
            Ok(request) => match self.transport.send(&request).await {
                Ok(reply) => self
                    .parser
                    .parse_agent_info(&reply.body)
                    .map(|agent| (agent, reply.tier)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        match outcome {
            Ok((agent, tier)) => AuthProbe {
                authenticated: tier.is_live(),
                tier: Some(tier),
                agent: Some(agent),
                error: None,
            },
            Err(e) => AuthProbe {
                authenticated: false,
                tier: None,
                agent: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn set_sentinel_map(&self, sentinels: SentinelMap) {
        self.decoder.replace_sentinels(sentinels);
    }

    pub fn set_availability_policy(&self, button: ButtonName, policy: AvailabilityPolicy) {
        self.decoder.set_policy(button, policy);
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats()
    }

    // Mock output is never cached
    async fn remember<T: Serialize + Sync>(&self, key: &Fingerprint, fetched: &Fetched<T>, ttl: Duration) {
        if fetched.tier.is_live() {
            self.cache.set(key, fetched, ttl).await;
        }
    }
}

fn pick(products: Vec<Product>, code: &str) -> Result<Product> {
    let wanted = code.trim();
    let returned = products.len();
    products
        .into_iter()
        .find(|p| p.code.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| Error::Partner {
            code: PartnerErrorCode::OptionNotFound,
            message: format!("no option {wanted} among {returned} returned"),
        })
}
