// OptAvail is one integer per day from DateFrom. Positive values are unit
// counts; zero and negatives are sentinels resolved through a SentinelMap.

use crate::calendar::CalendarDate;
use crate::error::{Error, Result};
use crate::model::{AvailabilityCalendar, AvailabilityCode, ButtonName, CalendarDay, Product};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelMap {
    entries: BTreeMap<i32, AvailabilityCode>,
}

impl Default for SentinelMap {
    fn default() -> Self {
        SentinelMap::empty()
            .with(-1, AvailabilityCode::Closed)
            .with(-2, AvailabilityCode::FreeSell)
            .with(-3, AvailabilityCode::OnRequest)
            .with(0, AvailabilityCode::Closed)
    }
}

impl SentinelMap {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn with(mut self, value: i32, code: AvailabilityCode) -> Self {
        self.entries.insert(value, code);
        self
    }

    // Explicit entries win; any other positive value is a unit count
    pub fn resolve(&self, value: i32) -> Option<AvailabilityCode> {
        match self.entries.get(&value) {
            Some(code) => Some(*code),
            None if value > 0 => Some(AvailabilityCode::Available(value as u32)),
            None => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot read sentinel entry {0:?}")]
pub struct InvalidSentinelMap(String);

// -1=closed,-2=free_sell,-3=on_request,0=closed
impl FromStr for SentinelMap {
    type Err = InvalidSentinelMap;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut map = SentinelMap::empty();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let bad = || InvalidSentinelMap(entry.to_string());
            let (value, code) = entry.split_once('=').ok_or_else(bad)?;
            let value: i32 = value.trim().parse().map_err(|_| bad())?;
            let code = match code.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                "closed" => AvailabilityCode::Closed,
                "free_sell" | "freesell" => AvailabilityCode::FreeSell,
                "on_request" | "onrequest" => AvailabilityCode::OnRequest,
                _ => return Err(bad()),
            };
            map = map.with(value, code);
        }
        Ok(map)
    }
}

// Which resolved codes may be sold for instant confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookableRule {
    OpenAllotment,
    CountedOnly,
    OnRequestAllowed,
}

impl BookableRule {
    pub fn allows(self, code: AvailabilityCode) -> bool {
        match self {
            BookableRule::OpenAllotment => code.is_open(),
            BookableRule::CountedOnly => matches!(code, AvailabilityCode::Available(_)),
            BookableRule::OnRequestAllowed => code != AvailabilityCode::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityPolicy {
    // None falls back to the decoder-wide map
    pub sentinels: Option<SentinelMap>,
    pub rule: BookableRule,
}

impl AvailabilityPolicy {
    pub fn rule(rule: BookableRule) -> Self {
        Self {
            sentinels: None,
            rule,
        }
    }

    pub fn with_sentinels(mut self, sentinels: SentinelMap) -> Self {
        self.sentinels = Some(sentinels);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityRules {
    pub sentinels: SentinelMap,
    pub rule: BookableRule,
    pub overrides: HashMap<ButtonName, AvailabilityPolicy>,
}

impl Default for AvailabilityRules {
    fn default() -> Self {
        AvailabilityRules::new(SentinelMap::default())
    }
}

impl AvailabilityRules {
    pub fn new(sentinels: SentinelMap) -> Self {
        let overrides = HashMap::from([
            (
                ButtonName::GroupTours,
                AvailabilityPolicy::rule(BookableRule::CountedOnly),
            ),
            (
                ButtonName::Cruises,
                AvailabilityPolicy::rule(BookableRule::OnRequestAllowed),
            ),
            (
                ButtonName::Rail,
                AvailabilityPolicy::rule(BookableRule::OnRequestAllowed),
            ),
        ]);
        Self {
            sentinels,
            rule: BookableRule::OpenAllotment,
            overrides,
        }
    }

    fn policy_for(&self, button: Option<&str>) -> (&SentinelMap, BookableRule) {
        let policy = button
            .map(|b| ButtonName::from(b.to_string()))
            .and_then(|b| self.overrides.get(&b));
        match policy {
            Some(policy) => (policy.sentinels.as_ref().unwrap_or(&self.sentinels), policy.rule),
            None => (&self.sentinels, self.rule),
        }
    }
}

#[derive(Debug, Default)]
pub struct AvailabilityDecoder {
    rules: RwLock<AvailabilityRules>,
}

impl AvailabilityDecoder {
    pub fn new(sentinels: SentinelMap) -> Self {
        Self::with_rules(AvailabilityRules::new(sentinels))
    }

    pub fn with_rules(rules: AvailabilityRules) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    pub fn sentinels(&self) -> SentinelMap {
        self.rules.read().sentinels.clone()
    }

    pub fn replace_sentinels(&self, sentinels: SentinelMap) {
        self.rules.write().sentinels = sentinels;
    }

    pub fn set_policy(&self, button: ButtonName, policy: AvailabilityPolicy) {
        self.rules.write().overrides.insert(button, policy);
    }

    pub fn decode_codes(&self, raw: &str) -> Result<Vec<AvailabilityCode>> {
        let rules = self.rules.read();
        resolve_tokens(&rules.sentinels, raw)
    }

    // Token 0 lands on `date_from`
    pub fn decode(&self, product: &Product, date_from: CalendarDate) -> Result<AvailabilityCalendar> {
        let raw = product
            .raw_availability
            .as_deref()
            .ok_or_else(|| Error::parse("option carries no OptAvail", &product.code))?;
        let rules = self.rules.read();
        let (sentinels, rule) = rules.policy_for(product.button.as_deref());
        let codes = resolve_tokens(sentinels, raw)?;

        let mut days = Vec::with_capacity(codes.len());
        for (i, code) in codes.into_iter().enumerate() {
            let date = date_from
                .offset(i as u32)
                .ok_or_else(|| Error::parse("availability runs past the calendar", raw))?;
            days.push(day(date, code, rule.allows(code) && product.rate_allows(date)));
        }

        debug!(product = %product.code, days = days.len(), "decoded availability");
        AvailabilityCalendar::new(product.code.clone(), days)
            .ok_or_else(|| Error::parse("empty OptAvail", raw))
    }

    // Exactly [from, to]. Sources in order: OptAvail, per-night StayPays, the
    // rate structure alone.
    pub fn calendar(
        &self,
        product: &Product,
        from: CalendarDate,
        to: CalendarDate,
    ) -> Result<AvailabilityCalendar> {
        if product.raw_availability.is_some() {
            return fit_to_window(self.decode(product, from)?, from, to);
        }

        let rules = self.rules.read();
        let (sentinels, rule) = rules.policy_for(product.button.as_deref());
        let mut days = Vec::with_capacity((from.days_until(to) + 1).max(0) as usize);

        if product.stay_pays.is_empty() {
            debug!(product = %product.code, "no allotment in reply, using rate structure");
            for date in from.through(to) {
                let allowed = product.rate_allows(date);
                let code = if allowed {
                    AvailabilityCode::FreeSell
                } else {
                    AvailabilityCode::Closed
                };
                days.push(day(date, code, allowed && rule.allows(code)));
            }
        } else {
            for date in from.through(to) {
                let mut best: Option<CalendarDay> = None;
                for pay in product.stay_pays.iter().filter(|p| p.date == date) {
                    let code = match pay.available {
                        Some(value) => sentinels.resolve(value).ok_or_else(|| {
                            Error::parse("unknown availability sentinel", &value.to_string())
                        })?,
                        None => AvailabilityCode::FreeSell,
                    };
                    let candidate = day(date, code, rule.allows(code) && product.rate_allows(date));
                    if best.map_or(true, |b| !b.bookable && candidate.bookable) {
                        best = Some(candidate);
                    }
                }
                days.push(best.unwrap_or_else(|| day(date, AvailabilityCode::Closed, false)));
            }
        }

        AvailabilityCalendar::new(product.code.clone(), days)
            .ok_or_else(|| Error::validation(format!("empty availability window {from}..{to}")))
    }
}

fn resolve_tokens(sentinels: &SentinelMap, raw: &str) -> Result<Vec<AvailabilityCode>> {
    raw.split_whitespace()
        .map(|token| {
            let value: i32 = token
                .parse()
                .map_err(|_| Error::parse("non-numeric availability token", token))?;
            sentinels
                .resolve(value)
                .ok_or_else(|| Error::parse("unknown availability sentinel", token))
        })
        .collect()
}

fn day(date: CalendarDate, code: AvailabilityCode, bookable: bool) -> CalendarDay {
    CalendarDay {
        date,
        weekday: date.weekday(),
        code,
        bookable,
    }
}

// Padding days are closed
pub fn fit_to_window(
    calendar: AvailabilityCalendar,
    from: CalendarDate,
    to: CalendarDate,
) -> Result<AvailabilityCalendar> {
    let expected = from.days_until(to) + 1;
    if calendar.date_from == from && calendar.len() as i64 == expected {
        return Ok(calendar);
    }

    warn!(
        product = %calendar.product_code,
        returned = calendar.len(),
        expected,
        "partner availability does not match the requested window"
    );
    let days = from
        .through(to)
        .map(|date| {
            calendar
                .get(date)
                .copied()
                .unwrap_or_else(|| day(date, AvailabilityCode::Closed, false))
        })
        .collect();
    AvailabilityCalendar::new(calendar.product_code.clone(), days)
        .ok_or_else(|| Error::validation(format!("empty availability window {from}..{to}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Weekday;
    use crate::model::{DateRange, DayOfWeekMask, RateSet, StayPay};
    use test_case::test_case;

    fn date(s: &str) -> CalendarDate {
        CalendarDate::parse(s).unwrap()
    }

    fn product(raw: &str, date_ranges: Vec<DateRange>) -> Product {
        Product {
            code: "CPTDTJOHTOUR01".into(),
            name: "Peninsula Day Tour".into(),
            description: None,
            supplier: None,
            location: None,
            category: None,
            button: None,
            duration: None,
            date_ranges,
            raw_availability: Some(raw.to_string()),
            stay_pays: Vec::new(),
            lead_price: None,
            notes: Vec::new(),
        }
    }

    fn rate(mask: Option<DayOfWeekMask>) -> RateSet {
        RateSet {
            name: Some("Standard".into()),
            price: Some(125_000),
            currency: "AUD".into(),
            single: None,
            double: None,
            twin: Some(125_000),
            days_of_week: mask,
        }
    }

    #[test_case("-1", AvailabilityCode::Closed)]
    #[test_case("-2", AvailabilityCode::FreeSell)]
    #[test_case("-3", AvailabilityCode::OnRequest)]
    #[test_case("0", AvailabilityCode::Closed)]
    #[test_case("7", AvailabilityCode::Available(7))]
    fn test_default_sentinels(token: &str, expected: AvailabilityCode) {
        let decoder = AvailabilityDecoder::default();
        assert_eq!(decoder.decode_codes(token).unwrap(), vec![expected]);
    }

    #[test]
    fn test_calendar_length_and_alignment() {
        let raw = "3 -1 -3 0 2 -2 5 5 5 5";
        let calendar = AvailabilityDecoder::default()
            .decode(&product(raw, Vec::new()), date("2025-10-28"))
            .unwrap();

        assert_eq!(calendar.len(), 10);
        assert_eq!(calendar.date_to, date("2025-11-06"));
        for (i, day) in calendar.days().iter().enumerate() {
            assert_eq!(day.date, date("2025-10-28").offset(i as u32).unwrap());
        }
        assert_eq!(calendar.days()[2].code, AvailabilityCode::OnRequest);
        assert!(!calendar.days()[2].bookable);
        assert!(calendar.days()[5].bookable, "free sell is bookable");
    }

    #[test]
    fn test_friday_mask_over_october() {
        let friday = DayOfWeekMask::from_days(&[Weekday::Friday]);
        let ranges = vec![DateRange {
            start: date("2025-10-01"),
            end: date("2025-10-31"),
            rate_sets: vec![rate(Some(friday))],
        }];
        let raw = vec!["4"; 31].join(" ");
        let calendar = AvailabilityDecoder::default()
            .decode(&product(&raw, ranges), date("2025-10-01"))
            .unwrap();

        let fridays: Vec<u32> = calendar.bookable_dates().map(|d| d.day()).collect();
        assert_eq!(fridays, vec![3, 10, 17, 24, 31]);
    }

    #[test]
    fn test_days_outside_every_range_are_not_bookable() {
        let ranges = vec![DateRange {
            start: date("2025-10-01"),
            end: date("2025-10-02"),
            rate_sets: vec![rate(None)],
        }];
        let calendar = AvailabilityDecoder::default()
            .decode(&product("4 4 4", ranges), date("2025-10-01"))
            .unwrap();
        let bookable: Vec<bool> = calendar.days().iter().map(|d| d.bookable).collect();
        assert_eq!(bookable, vec![true, true, false]);
    }

    #[test]
    fn test_unknown_sentinel_is_parse_error() {
        let err = AvailabilityDecoder::default().decode_codes("2 -9 2").unwrap_err();
        match err {
            Error::Parse { fragment, .. } => assert_eq!(fragment, "-9"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(AvailabilityDecoder::default().decode_codes("2 x").is_err());
    }

    #[test]
    fn test_sentinels_can_be_replaced_at_runtime() {
        let decoder = AvailabilityDecoder::default();
        decoder.replace_sentinels("-1=on_request,0=closed".parse().unwrap());
        assert_eq!(decoder.decode_codes("-1").unwrap(), vec![AvailabilityCode::OnRequest]);
        assert!(decoder.decode_codes("-2").is_err());
    }

    #[test]
    fn test_sentinel_map_parse_rejects_garbage() {
        let err = "-1=maybe".parse::<SentinelMap>().unwrap_err();
        assert_eq!(err.to_string(), r#"cannot read sentinel entry "-1=maybe""#);
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
        assert!("closed".parse::<SentinelMap>().is_err());
        assert_eq!("".parse::<SentinelMap>().unwrap(), SentinelMap::empty());
    }

    #[test]
    fn test_fit_pads_short_calendar_with_closed_days() {
        let calendar = AvailabilityDecoder::default()
            .decode(&product("4 4", Vec::new()), date("2025-10-01"))
            .unwrap();
        let fitted = fit_to_window(calendar, date("2025-10-01"), date("2025-10-04")).unwrap();
        assert_eq!(fitted.len(), 4);
        assert_eq!(fitted.days()[3].code, AvailabilityCode::Closed);
        assert!(!fitted.days()[3].bookable);
    }

    #[test]
    fn test_fit_clips_long_calendar() {
        let calendar = AvailabilityDecoder::default()
            .decode(&product("1 2 3 4 5", Vec::new()), date("2025-10-01"))
            .unwrap();
        let fitted = fit_to_window(calendar, date("2025-10-02"), date("2025-10-03")).unwrap();
        let codes: Vec<_> = fitted.days().iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![AvailabilityCode::Available(2), AvailabilityCode::Available(3)]
        );
    }

    fn stay(on: &str, available: Option<i32>) -> StayPay {
        StayPay {
            date: date(on),
            rate_name: None,
            pay: None,
            available,
        }
    }

    #[test]
    fn test_group_tours_need_a_counted_allotment() {
        let mut tour = product("-2 3", Vec::new());
        tour.button = Some("Group Tours".into());
        let calendar = AvailabilityDecoder::default()
            .decode(&tour, date("2025-10-01"))
            .unwrap();
        let bookable: Vec<bool> = calendar.days().iter().map(|d| d.bookable).collect();
        assert_eq!(bookable, vec![false, true]);
    }

    #[test]
    fn test_cruises_sell_on_request() {
        let mut cruise = product("-3 -1", Vec::new());
        cruise.button = Some("Cruises".into());
        let calendar = AvailabilityDecoder::default()
            .decode(&cruise, date("2025-10-01"))
            .unwrap();
        assert!(calendar.days()[0].bookable);
        assert!(!calendar.days()[1].bookable);
    }

    #[test]
    fn test_button_override_uses_its_own_sentinels() {
        let decoder = AvailabilityDecoder::default();
        decoder.set_policy(
            ButtonName::Packages,
            AvailabilityPolicy::rule(BookableRule::OpenAllotment)
                .with_sentinels("-1=free_sell".parse().unwrap()),
        );
        let mut package = product("-1", Vec::new());
        package.button = Some("Packages".into());
        let calendar = decoder.decode(&package, date("2025-10-01")).unwrap();
        assert_eq!(calendar.days()[0].code, AvailabilityCode::FreeSell);

        // other buttons keep the decoder-wide map
        let calendar = decoder
            .decode(&product("-1", Vec::new()), date("2025-10-01"))
            .unwrap();
        assert_eq!(calendar.days()[0].code, AvailabilityCode::Closed);
    }

    #[test]
    fn test_calendar_from_stay_pays() {
        let mut hotel = product("", Vec::new());
        hotel.raw_availability = None;
        hotel.stay_pays = vec![
            stay("2025-10-01", Some(2)),
            stay("2025-10-02", Some(-1)),
            stay("2025-10-02", Some(1)),
            stay("2025-10-03", None),
        ];
        let calendar = AvailabilityDecoder::default()
            .calendar(&hotel, date("2025-10-01"), date("2025-10-04"))
            .unwrap();

        let codes: Vec<_> = calendar.days().iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                AvailabilityCode::Available(2),
                AvailabilityCode::Available(1),
                AvailabilityCode::FreeSell,
                AvailabilityCode::Closed,
            ]
        );
        let bookable: Vec<bool> = calendar.days().iter().map(|d| d.bookable).collect();
        assert_eq!(bookable, vec![true, true, true, false]);
    }

    #[test]
    fn test_calendar_from_rate_structure_alone() {
        let friday = DayOfWeekMask::from_days(&[Weekday::Friday]);
        let mut tour = product("", vec![DateRange {
            start: date("2025-10-01"),
            end: date("2025-10-31"),
            rate_sets: vec![rate(Some(friday))],
        }]);
        tour.raw_availability = None;
        let calendar = AvailabilityDecoder::default()
            .calendar(&tour, date("2025-10-01"), date("2025-10-07"))
            .unwrap();

        assert_eq!(calendar.len(), 7);
        let bookable: Vec<u32> = calendar.bookable_dates().map(|d| d.day()).collect();
        assert_eq!(bookable, vec![3]);
        assert_eq!(calendar.days()[0].code, AvailabilityCode::Closed);
        assert_eq!(calendar.days()[2].code, AvailabilityCode::FreeSell);
    }

    #[test]
    fn test_calendar_prefers_opt_avail() {
        let calendar = AvailabilityDecoder::default()
            .calendar(&product("4 -1", Vec::new()), date("2025-10-01"), date("2025-10-03"))
            .unwrap();
        let codes: Vec<_> = calendar.days().iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                AvailabilityCode::Available(4),
                AvailabilityCode::Closed,
                AvailabilityCode::Closed,
            ]
        );
    }
}
