// Two passes: an event scan for completeness and the fault envelope, then
// serde into the wire structs.

use crate::calendar::{CalendarDate, Weekday};
use crate::error::{truncate, Error, PartnerErrorCode, Result};
use crate::model::{
    AgentInfo, BookingConfirmation, ButtonDetails, DateRange, DayOfWeekMask, Money, Product,
    ProductNote, RateSet, StayPay,
};
use crate::xml_reply::{
    XmlAddServiceReply, XmlButtonDetailsReply, XmlDaysOfWeek, XmlOption, XmlOptDateRange,
    XmlRateSet, XmlReply, XmlStayRateSet,
};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::{debug, warn};

pub const DEFAULT_CURRENCY: &str = "AUD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerFault {
    pub code: PartnerErrorCode,
    pub message: String,
}

impl From<PartnerFault> for Error {
    fn from(fault: PartnerFault) -> Self {
        Error::Partner {
            code: fault.code,
            message: fault.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    OptionInfo(Vec<Product>),
    Booking(BookingConfirmation),
    AgentInfo(AgentInfo),
    ButtonDetails(ButtonDetails),
    Error(PartnerFault),
}

#[derive(Debug, Default, Clone)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, xml: &str) -> Result<Reply> {
        if let Some(fault) = scan(xml)? {
            debug!(code = %fault.code, "partner returned a fault");
            return Ok(Reply::Error(fault));
        }

        let reply: XmlReply = quick_xml::de::from_str(xml)
            .map_err(|e| Error::parse(format!("reply does not match schema: {e}"), xml))?;

        if let Some(options) = reply.option_info_reply {
            let products = options
                .options
                .into_iter()
                .map(Product::try_from)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Reply::OptionInfo(products));
        }
        if let Some(booking) = reply.add_service_reply {
            return BookingConfirmation::try_from(booking).map(Reply::Booking);
        }
        if let Some(agent) = reply.agent_info_reply {
            return Ok(Reply::AgentInfo(AgentInfo {
                name: clean(agent.name),
                currency: clean(agent.currency),
            }));
        }
        if let Some(details) = reply.get_service_button_details_reply {
            return Ok(Reply::ButtonDetails(ButtonDetails::from(details)));
        }
        Err(Error::parse("reply carries no recognised reply element", xml))
    }

    pub fn parse_options(&self, xml: &str) -> Result<Vec<Product>> {
        match self.parse(xml)? {
            Reply::OptionInfo(products) => Ok(products),
            Reply::Error(fault) => Err(fault.into()),
            _ => Err(Error::parse("expected OptionInfoReply", xml)),
        }
    }

    pub fn parse_booking(&self, xml: &str) -> Result<BookingConfirmation> {
        match self.parse(xml)? {
            Reply::Booking(confirmation) => Ok(confirmation),
            Reply::Error(fault) => Err(fault.into()),
            _ => Err(Error::parse("expected AddServiceReply", xml)),
        }
    }

    pub fn parse_agent_info(&self, xml: &str) -> Result<AgentInfo> {
        match self.parse(xml)? {
            Reply::AgentInfo(agent) => Ok(agent),
            Reply::Error(fault) => Err(fault.into()),
            _ => Err(Error::parse("expected AgentInfoReply", xml)),
        }
    }

    pub fn parse_button_details(&self, xml: &str) -> Result<ButtonDetails> {
        match self.parse(xml)? {
            Reply::ButtonDetails(details) => Ok(details),
            Reply::Error(fault) => Err(fault.into()),
            _ => Err(Error::parse("expected GetServiceButtonDetailsReply", xml)),
        }
    }
}

// Fault fields found while walking the document
#[derive(Default)]
struct FaultFields {
    text: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

// Checks completeness and extracts a partner fault, if any.
fn scan(xml: &str) -> Result<Option<PartnerFault>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut saw_root = false;
    let mut in_fault = false;
    let mut fault: Option<FaultFields> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                saw_root = true;
                let name = e.local_name();
                let name = name.as_ref();
                let top_level_error = depth == 2 && name == b"Error";
                if name == b"ErrorReply" {
                    in_fault = true;
                    fault.get_or_insert_with(FaultFields::default);
                } else if in_fault || top_level_error {
                    let fields = fault.get_or_insert_with(FaultFields::default);
                    match name {
                        b"Error" | b"ErrorCode" | b"ErrorMessage" => {
                            let raw = reader
                                .read_text(e.name())
                                .map_err(|err| malformed(xml, reader.error_position(), err))?;
                            depth -= 1;
                            record(fields, name, &raw)?;
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Empty(_)) => saw_root = true,
            Ok(Event::End(e)) => {
                depth = depth.saturating_sub(1);
                if e.local_name().as_ref() == b"ErrorReply" {
                    in_fault = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(malformed(xml, reader.error_position(), err)),
            _ => (),
        }
    }

    if !saw_root {
        return Err(Error::parse("empty reply document", xml));
    }
    if depth != 0 {
        let mut start = xml.len().saturating_sub(80);
        while !xml.is_char_boundary(start) {
            start -= 1;
        }
        return Err(Error::parse(
            format!("truncated reply: {depth} element(s) left open"),
            &xml[start..],
        ));
    }
    Ok(fault.map(into_fault))
}

fn record(fields: &mut FaultFields, name: &[u8], raw: &str) -> Result<()> {
    let text = unescape(raw);
    match name {
        // <Error> is either plain text or wraps ErrorCode/ErrorMessage
        b"Error" if raw.contains('<') => {
            let mut inner = Reader::from_str(raw);
            inner.config_mut().trim_text(true);
            loop {
                match inner.read_event() {
                    Ok(Event::Start(e)) => {
                        let child = e.local_name().as_ref().to_vec();
                        if child == b"ErrorCode" || child == b"ErrorMessage" {
                            let value = inner
                                .read_text(e.name())
                                .map_err(|err| malformed(raw, inner.error_position(), err))?;
                            record(fields, &child, &value)?;
                        }
                    }
                    Ok(Event::Eof) => break,
                    Err(err) => return Err(malformed(raw, inner.error_position(), err)),
                    _ => (),
                }
            }
        }
        b"Error" => fields.text = Some(text),
        b"ErrorCode" => fields.code = Some(text),
        _ => fields.message = Some(text),
    }
    Ok(())
}

fn into_fault(fields: FaultFields) -> PartnerFault {
    // "1051 SCN Agent authentication failed" carries its code up front
    let (leading_code, rest) = match fields.text.as_deref() {
        Some(text) => {
            let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                (None, Some(text.to_string()))
            } else {
                (Some(digits.clone()), Some(text[digits.len()..].trim().to_string()))
            }
        }
        None => (None, None),
    };

    let code = PartnerErrorCode::from_code(
        fields
            .code
            .as_deref()
            .or(leading_code.as_deref())
            .unwrap_or("1000"),
    );
    let message = fields
        .message
        .or(rest)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| code.description().to_string());
    PartnerFault { code, message }
}

fn malformed(xml: &str, position: u64, err: quick_xml::Error) -> Error {
    let at = (position as usize).min(xml.len());
    let mut start = at.saturating_sub(40);
    while !xml.is_char_boundary(start) {
        start -= 1;
    }
    Error::parse(format!("malformed XML at byte {position}: {err}"), truncate(&xml[start..], 80))
}

fn unescape(raw: &str) -> String {
    quick_xml::escape::unescape(raw)
        .map(|text| text.trim().to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(raw: &str, field: &str) -> Result<CalendarDate> {
    CalendarDate::parse(raw).map_err(|_| Error::parse(format!("bad {field} date"), raw))
}

// Partner amounts are integer minor units; tolerate a decimal rendering.
fn parse_amount(raw: &str, field: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.round() as i64),
        _ => Err(Error::parse(format!("bad {field} amount"), raw)),
    }
}

fn optional_amount(raw: Option<String>, field: &str) -> Result<Option<i64>> {
    clean(raw).map(|v| parse_amount(&v, field)).transpose()
}

impl From<&XmlDaysOfWeek> for DayOfWeekMask {
    fn from(days: &XmlDaysOfWeek) -> Self {
        let flags = [
            &days.mon, &days.tues, &days.weds, &days.thurs, &days.fri, &days.sat, &days.sun,
        ];
        Weekday::ALL
            .into_iter()
            .zip(flags)
            .filter(|(_, flag)| {
                flag.as_deref()
                    .map_or(false, |f| f.trim().eq_ignore_ascii_case("Y"))
            })
            .fold(DayOfWeekMask::EMPTY, |mask, (day, _)| mask.with(day))
    }
}

fn rate_set(set: XmlRateSet, currency: &str) -> Result<RateSet> {
    let rates = set.opt_rate.and_then(|r| r.room_rates).unwrap_or_default();
    let single = optional_amount(rates.single_rate, "SingleRate")?;
    let double = optional_amount(rates.double_rate, "DoubleRate")?;
    let twin = optional_amount(rates.twin_rate, "TwinRate")?;
    Ok(RateSet {
        name: clean(set.rate_name),
        price: twin.or(double).or(single),
        currency: currency.to_string(),
        single,
        double,
        twin,
        days_of_week: set.applies_days_of_week.as_ref().map(DayOfWeekMask::from),
    })
}

fn date_range(range: XmlOptDateRange, fallback_currency: &str) -> Result<DateRange> {
    let start = parse_date(&range.date_from, "DateFrom")?;
    let end = parse_date(&range.date_to, "DateTo")?;
    if end < start {
        return Err(Error::parse(
            "date range ends before it starts",
            &format!("{start}..{end}"),
        ));
    }
    let currency = clean(range.currency).unwrap_or_else(|| fallback_currency.to_string());
    let rate_sets = range
        .rate_sets
        .map(|r| r.sets)
        .unwrap_or_default()
        .into_iter()
        .map(|set| rate_set(set, &currency))
        .collect::<Result<Vec<_>>>()?;
    Ok(DateRange {
        start,
        end,
        rate_sets,
    })
}

fn stay_pays(rate_set: XmlStayRateSet, fallback_currency: &str) -> Result<Vec<StayPay>> {
    let mut pays = Vec::new();
    for stay in rate_set.rate_stays.map(|r| r.stays).unwrap_or_default() {
        let rate_name = clean(stay.rate_name);
        for pay in stay.stay_pays.map(|p| p.pays).unwrap_or_default() {
            let date = parse_date(pay.date.trim(), "StayPay")?;
            let currency = clean(pay.currency).unwrap_or_else(|| fallback_currency.to_string());
            let available = clean(pay.available)
                .map(|a| {
                    a.parse::<i32>()
                        .map_err(|_| Error::parse("bad StayPay Available value", &a))
                })
                .transpose()?;
            pays.push(StayPay {
                date,
                rate_name: rate_name.clone(),
                pay: optional_amount(pay.pay, "Pay")?.map(|amount_minor| Money {
                    amount_minor,
                    currency,
                }),
                available,
            });
        }
    }
    // stable: per-date order follows the reply
    pays.sort_by_key(|p| p.date);
    Ok(pays)
}

// Blank entries dropped, first occurrence kept
fn descriptions(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items.into_iter().filter_map(|i| clean(Some(i))) {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

impl From<XmlButtonDetailsReply> for ButtonDetails {
    fn from(reply: XmlButtonDetailsReply) -> Self {
        ButtonDetails {
            countries: descriptions(
                reply
                    .countries
                    .map(|c| c.items)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|c| c.country_name)
                    .collect(),
            ),
            localities: descriptions(
                reply
                    .locality_descriptions
                    .map(|l| l.items)
                    .unwrap_or_default(),
            ),
            classes: descriptions(reply.class_descriptions.map(|c| c.items).unwrap_or_default()),
        }
    }
}

impl TryFrom<XmlOption> for Product {
    type Error = Error;

    fn try_from(option: XmlOption) -> Result<Self> {
        let code = option.opt.trim().to_string();
        if code.is_empty() {
            return Err(Error::parse("Option without an Opt code", "<Opt/>"));
        }
        let general = option.opt_general.unwrap_or_default();
        let mut stay = option.opt_stay_results;
        let stay_rate_set = stay.as_mut().and_then(|s| s.rate_set.take());
        let currency = stay
            .as_ref()
            .and_then(|s| clean(s.currency.clone()))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let stay_pays = match stay_rate_set {
            Some(rate_set) => stay_pays(rate_set, &currency)?,
            None => Vec::new(),
        };

        let mut date_ranges = option
            .opt_date_ranges
            .map(|r| r.ranges)
            .unwrap_or_default()
            .into_iter()
            .map(|range| date_range(range, &currency))
            .collect::<Result<Vec<_>>>()?;
        date_ranges.sort_by_key(|r| r.start);
        if let Some(pair) = date_ranges.windows(2).find(|w| w[1].start <= w[0].end) {
            return Err(Error::parse(
                format!("overlapping date ranges on option {code}"),
                &format!("{}..{} / {}..{}", pair[0].start, pair[0].end, pair[1].start, pair[1].end),
            ));
        }

        let lead_price = match stay {
            Some(stay) => {
                let amount = optional_amount(stay.agent_price, "AgentPrice")?
                    .or(optional_amount(stay.total_price, "TotalPrice")?);
                amount.map(|amount_minor| Money {
                    amount_minor,
                    currency: currency.clone(),
                })
            }
            None => None,
        };

        let duration = clean(general.periods)
            .map(|p| {
                p.parse::<u32>()
                    .map_err(|_| Error::parse("bad Periods value", &p))
            })
            .transpose()?;

        let notes = option
            .option_notes
            .map(|n| n.notes)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|note| {
                clean(note.note_text).map(|text| ProductNote {
                    category: clean(note.note_category).unwrap_or_default(),
                    text,
                })
            })
            .collect();

        let name = clean(general.description.clone()).unwrap_or_else(|| {
            warn!(code = %code, "option has no description, using its code as name");
            code.clone()
        });

        Ok(Product {
            name,
            description: clean(general.comment),
            supplier: clean(general.supplier_name),
            location: clean(general.locality_description),
            category: clean(general.class_description),
            button: clean(general.button_name),
            duration,
            date_ranges,
            raw_availability: clean(option.opt_avail),
            stay_pays,
            lead_price,
            notes,
            code,
        })
    }
}

impl TryFrom<XmlAddServiceReply> for BookingConfirmation {
    type Error = Error;

    fn try_from(reply: XmlAddServiceReply) -> Result<Self> {
        let booking_id = clean(reply.booking_id)
            .ok_or_else(|| Error::parse("AddServiceReply without BookingId", "<AddServiceReply>"))?;
        let currency = clean(reply.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        Ok(BookingConfirmation {
            booking_id,
            reference: clean(reply.reference),
            status: clean(reply.status).unwrap_or_else(|| "??".to_string()),
            total_price: optional_amount(reply.total_price, "TotalPrice")?.map(|amount_minor| {
                Money {
                    amount_minor,
                    currency,
                }
            }),
        })
    }
}
