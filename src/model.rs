use crate::calendar::{CalendarDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

// Partner category selectors
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ButtonName {
    Accommodation,
    DayTours,
    GroupTours,
    Packages,
    Cruises,
    Rail,
    SpecialOffers,
    Other(String),
}

impl ButtonName {
    pub fn as_str(&self) -> &str {
        match self {
            ButtonName::Accommodation => "Accommodation",
            ButtonName::DayTours => "Day Tours",
            ButtonName::GroupTours => "Group Tours",
            ButtonName::Packages => "Packages",
            ButtonName::Cruises => "Cruises",
            ButtonName::Rail => "Rail",
            ButtonName::SpecialOffers => "Special Offers",
            ButtonName::Other(name) => name,
        }
    }
}

impl From<String> for ButtonName {
    fn from(value: String) -> Self {
        match value.trim() {
            "Accommodation" => ButtonName::Accommodation,
            "Day Tours" => ButtonName::DayTours,
            "Group Tours" => ButtonName::GroupTours,
            "Packages" => ButtonName::Packages,
            "Cruises" => ButtonName::Cruises,
            "Rail" => ButtonName::Rail,
            "Special Offers" => ButtonName::SpecialOffers,
            _ => ButtonName::Other(value),
        }
    }
}

impl From<ButtonName> for String {
    fn from(value: ButtonName) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ButtonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoomType {
    Single,
    #[default]
    Double,
    Twin,
    Triple,
    Quad,
}

impl RoomType {
    pub fn code(self) -> &'static str {
        match self {
            RoomType::Single => "SG",
            RoomType::Double => "DB",
            RoomType::Twin => "TW",
            RoomType::Triple => "TR",
            RoomType::Quad => "QU",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occupancy {
    pub adults: u32,
    pub children: u32,
    pub room_type: RoomType,
}

impl Occupancy {
    pub fn new(adults: u32, children: u32) -> Self {
        Self {
            adults,
            children,
            room_type: RoomType::default(),
        }
    }

    pub fn with_room_type(mut self, room_type: RoomType) -> Self {
        self.room_type = room_type;
        self
    }
}

impl Default for Occupancy {
    fn default() -> Self {
        Self::new(2, 0)
    }
}

// Search parameters. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    pub button: ButtonName,
    pub destination: Option<String>,
    pub country: Option<String>,
    pub date_from: Option<CalendarDate>,
    pub date_to: Option<CalendarDate>,
    pub occupancy: Occupancy,
    pub service_level: Option<String>,
}

impl SearchCriteria {
    pub fn new(button: ButtonName) -> Self {
        Self {
            button,
            destination: None,
            country: None,
            date_from: None,
            date_to: None,
            occupancy: Occupancy::default(),
            service_level: None,
        }
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn dates(mut self, from: CalendarDate, to: CalendarDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn travelers(mut self, adults: u32, children: u32) -> Self {
        self.occupancy.adults = adults;
        self.occupancy.children = children;
        self
    }

    pub fn room_type(mut self, room_type: RoomType) -> Self {
        self.occupancy.room_type = room_type;
        self
    }

    pub fn service_level(mut self, level: impl Into<String>) -> Self {
        self.service_level = Some(level.into());
        self
    }

    // Where the partner should look: the destination, else the country.
    pub fn location(&self) -> Option<&str> {
        non_blank(self.destination.as_deref()).or_else(|| non_blank(self.country.as_deref()))
    }

    pub fn normalized(&self) -> NormalizedSearch {
        NormalizedSearch {
            button: fold(Some(self.button.as_str())),
            destination: fold(self.destination.as_deref()),
            country: fold(self.country.as_deref()),
            date_from: self.date_from,
            date_to: self.date_to,
            adults: self.occupancy.adults,
            children: self.occupancy.children,
            room_type: self.occupancy.room_type.code(),
            service_level: fold(self.service_level.as_deref()),
        }
    }
}

// Field order here is the fingerprint's canonical order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedSearch {
    pub button: Option<String>,
    pub destination: Option<String>,
    pub country: Option<String>,
    pub date_from: Option<CalendarDate>,
    pub date_to: Option<CalendarDate>,
    pub adults: u32,
    pub children: u32,
    pub room_type: &'static str,
    pub service_level: Option<String>,
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn fold(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_lowercase)
}

// 7-bit weekday set, bit 0 is Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayOfWeekMask(u8);

impl DayOfWeekMask {
    pub const EMPTY: DayOfWeekMask = DayOfWeekMask(0);
    pub const ALL: DayOfWeekMask = DayOfWeekMask(0b111_1111);

    pub fn from_days(days: &[Weekday]) -> Self {
        days.iter().fold(Self::EMPTY, |mask, day| mask.with(*day))
    }

    pub fn with(self, day: Weekday) -> Self {
        DayOfWeekMask(self.0 | (1 << day.index()))
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn days(self) -> impl Iterator<Item = Weekday> {
        Weekday::ALL.into_iter().filter(move |d| self.contains(*d))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvailabilityCode {
    Available(u32),
    FreeSell,
    OnRequest,
    Closed,
}

impl AvailabilityCode {
    // Open allotment: instant confirmation is possible.
    pub fn is_open(self) -> bool {
        matches!(self, AvailabilityCode::Available(_) | AvailabilityCode::FreeSell)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSet {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub currency: String,
    pub single: Option<i64>,
    pub double: Option<i64>,
    pub twin: Option<i64>,
    // `None` means the rate applies every day.
    pub days_of_week: Option<DayOfWeekMask>,
}

impl RateSet {
    pub fn applies_on(&self, day: Weekday) -> bool {
        self.days_of_week.map_or(true, |mask| mask.contains(day))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: CalendarDate,
    pub end: CalendarDate,
    pub rate_sets: Vec<RateSet>,
}

impl DateRange {
    pub fn covers(&self, date: CalendarDate) -> bool {
        self.start <= date && date <= self.end
    }

    // A range with no rate sets places no weekday restriction.
    pub fn allows(&self, day: Weekday) -> bool {
        self.rate_sets.is_empty() || self.rate_sets.iter().any(|r| r.applies_on(day))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductNote {
    pub category: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub supplier: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub button: Option<String>,
    // Base duration in periods (nights or days depending on category).
    pub duration: Option<u32>,
    pub date_ranges: Vec<DateRange>,
    pub raw_availability: Option<String>,
    #[serde(default)]
    pub stay_pays: Vec<StayPay>,
    pub lead_price: Option<Money>,
    pub notes: Vec<ProductNote>,
}

impl Product {
    pub fn rate_allows(&self, date: CalendarDate) -> bool {
        if self.date_ranges.is_empty() {
            return true;
        }
        let weekday = date.weekday();
        self.date_ranges
            .iter()
            .filter(|range| range.covers(date))
            .any(|range| range.allows(weekday))
    }
}

// One priced night from OptStayResults; `available` is the raw allotment value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayPay {
    pub date: CalendarDate,
    pub rate_name: Option<String>,
    pub pay: Option<Money>,
    pub available: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: CalendarDate,
    pub weekday: Weekday,
    pub code: AvailabilityCode,
    pub bookable: bool,
}

// Per-day status aligned 1:1 with `[date_from, date_to]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityCalendar {
    pub product_code: String,
    pub date_from: CalendarDate,
    pub date_to: CalendarDate,
    days: Vec<CalendarDay>,
}

impl AvailabilityCalendar {
    // Returns `None` when `days` is empty or not consecutive from its first date.
    pub fn new(product_code: impl Into<String>, days: Vec<CalendarDay>) -> Option<Self> {
        let first = days.first()?.date;
        let consecutive = days
            .iter()
            .enumerate()
            .all(|(i, day)| first.offset(i as u32) == Some(day.date));
        if !consecutive {
            return None;
        }
        let last = days.last()?.date;
        Some(Self {
            product_code: product_code.into(),
            date_from: first,
            date_to: last,
            days,
        })
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn days(&self) -> &[CalendarDay] {
        &self.days
    }

    pub fn get(&self, date: CalendarDate) -> Option<&CalendarDay> {
        let index = self.date_from.days_until(date);
        if index < 0 {
            return None;
        }
        self.days.get(index as usize)
    }

    pub fn bookable_dates(&self) -> impl Iterator<Item = CalendarDate> + '_ {
        self.days.iter().filter(|d| d.bookable).map(|d| d.date)
    }

    pub fn into_days(self) -> Vec<CalendarDay> {
        self.days
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub guest_name: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub product_code: String,
    pub rate_id: Option<String>,
    pub date_from: CalendarDate,
    pub occupancy: Occupancy,
    // Quote only: the partner prices and holds but does not confirm.
    pub quote_only: bool,
    pub remark: Option<String>,
}

impl BookingRequest {
    pub fn new(
        guest_name: impl Into<String>,
        product_code: impl Into<String>,
        date_from: CalendarDate,
    ) -> Self {
        Self {
            guest_name: guest_name.into(),
            email: None,
            mobile: None,
            product_code: product_code.into(),
            rate_id: None,
            date_from,
            occupancy: Occupancy::default(),
            quote_only: false,
            remark: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub booking_id: String,
    pub reference: Option<String>,
    pub status: String,
    pub total_price: Option<Money>,
}

impl BookingConfirmation {
    pub fn is_confirmed(&self) -> bool {
        self.status.eq_ignore_ascii_case("OK")
    }
}

// Countries, destinations and service levels offered under one button
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonDetails {
    pub countries: Vec<String>,
    pub localities: Vec<String>,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: Option<String>,
    pub currency: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> CalendarDate {
        CalendarDate::parse(s).unwrap()
    }

    #[test]
    fn test_normalized_search_folds_case_and_whitespace() {
        let a = SearchCriteria::new(ButtonName::DayTours)
            .destination("  Cape Town ")
            .dates(date("2025-10-01"), date("2025-10-05"));
        let b = SearchCriteria::new(ButtonName::DayTours)
            .destination("cape town")
            .country("")
            .dates(date("2025-10-01"), date("2025-10-05"));
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn test_location_prefers_destination_over_country() {
        let criteria = SearchCriteria::new(ButtonName::Accommodation)
            .country("Kenya")
            .destination(" ");
        assert_eq!(criteria.location(), Some("Kenya"));
    }

    #[test]
    fn test_button_name_round_trips_known_labels() {
        assert_eq!(ButtonName::from("Day Tours".to_string()), ButtonName::DayTours);
        assert_eq!(
            ButtonName::from("Safaris".to_string()),
            ButtonName::Other("Safaris".into())
        );
    }

    #[test]
    fn test_mask_membership() {
        let mask = DayOfWeekMask::from_days(&[Weekday::Friday, Weekday::Sunday]);
        assert!(mask.contains(Weekday::Friday));
        assert!(!mask.contains(Weekday::Saturday));
        assert_eq!(mask.days().collect::<Vec<_>>(), vec![Weekday::Friday, Weekday::Sunday]);
        assert!(DayOfWeekMask::ALL.days().count() == 7);
    }

    #[test]
    fn test_product_without_ranges_allows_every_day() {
        let product = Product {
            code: "X".into(),
            name: "X".into(),
            description: None,
            supplier: None,
            location: None,
            category: None,
            button: None,
            duration: None,
            date_ranges: Vec::new(),
            raw_availability: None,
            stay_pays: Vec::new(),
            lead_price: None,
            notes: Vec::new(),
        };
        assert!(product.rate_allows(date("2025-10-06")));
    }

    #[test]
    fn test_calendar_rejects_gaps() {
        let day = |d: &str| CalendarDay {
            date: date(d),
            weekday: date(d).weekday(),
            code: AvailabilityCode::Closed,
            bookable: false,
        };
        assert!(AvailabilityCalendar::new("X", vec![day("2025-10-01"), day("2025-10-03")]).is_none());
        let cal = AvailabilityCalendar::new("X", vec![day("2025-10-01"), day("2025-10-02")]).unwrap();
        assert_eq!(cal.date_to, date("2025-10-02"));
        assert_eq!(cal.get(date("2025-10-02")).unwrap().date, date("2025-10-02"));
        assert!(cal.get(date("2025-09-30")).is_none());
    }
}
