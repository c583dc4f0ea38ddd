// Integration layer between the storefront and the HostConnect partner system

pub mod availability;
pub mod cache;
pub mod calendar;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod mock;
pub mod model;
pub mod request;
pub mod response;
pub mod transport;
mod xml_reply;

// Re-export key types for convenience
pub use availability::{
    AvailabilityDecoder, AvailabilityPolicy, AvailabilityRules, BookableRule, SentinelMap,
};
pub use cache::{CacheTtl, Fingerprint, KvStore, MemoryStore, ResponseCache, UpstashStore};
pub use calendar::{CalendarDate, Weekday};
pub use client::{HostConnectClient, Listing};
pub use config::{Credentials, PartnerConfig, PartnerMode};
pub use diagnostics::{ConnectivityReport, IpProbe};
pub use error::{ConfigError, Error, PartnerErrorCode, Result};
pub use model::{
    AvailabilityCalendar, AvailabilityCode, BookingConfirmation, BookingRequest, ButtonDetails,
    ButtonName, CalendarDay, Occupancy, Product, SearchCriteria, StayPay,
};
pub use request::{PreparedRequest, RequestBuilder};
pub use response::{Reply, ResponseParser};
pub use transport::{Fetched, HttpTransport, Transport, TransportTier};
