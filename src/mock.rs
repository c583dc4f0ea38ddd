// Offline partner. Replies depend only on the request hints.

use crate::calendar::CalendarDate;
use crate::request::{Operation, PreparedRequest};
use quick_xml::escape::escape;
use std::fmt::Write;

const SEARCH_RESULTS: u32 = 3;
const CLASSES: [&str; 3] = ["Standard", "Superior", "Deluxe"];
const COUNTRIES: [&str; 3] = ["South Africa", "Kenya", "Zimbabwe"];
const LOCALITIES: [&str; 4] = ["Cape Town", "Johannesburg", "Nairobi", "Victoria Falls"];
// Offline bookings never report as confirmed
pub const MOCK_BOOKING_STATUS: &str = "MOCK";

#[derive(Debug, Clone, Default)]
pub struct MockPartner;

impl MockPartner {
    pub fn new() -> Self {
        Self
    }

    pub fn reply(&self, request: &PreparedRequest) -> String {
        let body = match request.operation {
            Operation::OptionInfo => match request.hints.product_code.as_deref() {
                Some(code) => format!(
                    "<OptionInfoReply>{}</OptionInfoReply>",
                    detail_option(code)
                ),
                None => format!("<OptionInfoReply>{}</OptionInfoReply>", search_options(request)),
            },
            Operation::Pricing => format!(
                "<OptionInfoReply>{}</OptionInfoReply>",
                priced_option(request)
            ),
            Operation::Booking => booking(request),
            Operation::AgentInfo => {
                "<AgentInfoReply><Name>Offline Demo Agent</Name><Currency>AUD</Currency></AgentInfoReply>"
                    .to_string()
            }
            Operation::ButtonDetails => button_details(),
        };
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Reply>{body}</Reply>")
    }
}

// Stable small number derived from text
fn seed(text: &str) -> u32 {
    text.bytes()
        .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)))
}

fn code_prefix(text: &str, len: usize) -> String {
    let mut prefix: String = text
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(len)
        .collect::<String>()
        .to_ascii_uppercase();
    while prefix.len() < len {
        prefix.push('X');
    }
    prefix
}

fn date_range(from: CalendarDate, to: CalendarDate, twin_rate: u32) -> String {
    format!(
        "<OptDateRanges><OptDateRange><DateFrom>{from}</DateFrom><DateTo>{to}</DateTo>\
         <Currency>AUD</Currency><RateSets><RateSet><RateName>Standard</RateName>\
         <OptRate><RoomRates><TwinRate>{twin_rate}</TwinRate></RoomRates></OptRate>\
         </RateSet></RateSets></OptDateRange></OptDateRanges>"
    )
}

// Mostly open with one closed day a week and an on-request day mid-week
fn allotment(code: &str, days: u32) -> String {
    let shift = seed(code) % 7;
    (0..days)
        .map(|i| match (i + shift) % 7 {
            6 => "-1".to_string(),
            3 => "-3".to_string(),
            n => (n + 2).to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn search_options(request: &PreparedRequest) -> String {
    let location = request.hints.location.as_deref().unwrap_or("Sample");
    let button = request.hints.button.as_deref().unwrap_or("Day Tours");
    let mut xml = String::new();
    for n in 1..=SEARCH_RESULTS {
        let code = format!(
            "{}{}MOCK{n:03}",
            code_prefix(location, 3),
            code_prefix(button, 2)
        );
        let price = 100_000 + 25_000 * n + seed(&code) % 1_000;
        let _ = write!(
            xml,
            "<Option><Opt>{code}</Opt><OptGeneral><SupplierName>Demo Supplier {n}</SupplierName>\
             <Description>{name}</Description><Comment>Sample content for offline browsing</Comment>\
             <LocalityDescription>{location}</LocalityDescription><ClassDescription>{class}</ClassDescription>\
             <ButtonName>{button}</ButtonName><Periods>{periods}</Periods></OptGeneral>",
            name = escape(format!("{location} {button} {n}").as_str()),
            location = escape(location),
            button = escape(button),
            class = CLASSES[(n as usize - 1) % CLASSES.len()],
            periods = n,
        );
        if let Some((from, to)) = request.hints.window {
            xml.push_str(&date_range(from, to, price));
        }
        let _ = write!(
            xml,
            "<OptStayResults><Currency>AUD</Currency><TotalPrice>{price}</TotalPrice>\
             <AgentPrice>{price}</AgentPrice></OptStayResults></Option>"
        );
    }
    xml
}

fn detail_option(code: &str) -> String {
    format!(
        "<Option><Opt>{code}</Opt><OptGeneral><SupplierName>Demo Supplier</SupplierName>\
         <Description>Sample product {code}</Description>\
         <Comment>Offline product detail</Comment><ClassDescription>Standard</ClassDescription>\
         <Periods>1</Periods></OptGeneral><OptionNotes>\
         <OptionNote><NoteCategory>INC</NoteCategory><NoteText>Sample inclusions</NoteText></OptionNote>\
         </OptionNotes></Option>",
        code = escape(code)
    )
}

fn priced_option(request: &PreparedRequest) -> String {
    let code = request.hints.product_code.as_deref().unwrap_or("MOCK");
    let twin = 120_000 + seed(code) % 50_000;
    let mut xml = format!("<Option><Opt>{}</Opt>", escape(code));
    if let Some((from, to)) = request.hints.window {
        let days = from.days_until(to).max(0) as u32 + 1;
        let _ = write!(
            xml,
            "<OptGeneral><Description>Sample product {}</Description></OptGeneral>\
             <OptAvail>{}</OptAvail>{}",
            escape(code),
            allotment(code, days),
            date_range(from, to, twin)
        );
    }
    let _ = write!(
        xml,
        "<OptStayResults><Currency>AUD</Currency><TotalPrice>{twin}</TotalPrice></OptStayResults></Option>"
    );
    xml
}

fn booking(request: &PreparedRequest) -> String {
    let code = request.hints.product_code.as_deref().unwrap_or("MOCK");
    let date = request
        .hints
        .window
        .map(|(from, _)| from.to_string())
        .unwrap_or_default();
    let guest = request.hints.guest_name.as_deref().unwrap_or_default();
    let id = seed(&format!("{code}|{date}|{guest}")) % 1_000_000;
    format!(
        "<AddServiceReply><BookingId>{id}</BookingId><Ref>MOCK{id:06}</Ref>\
         <Status>{MOCK_BOOKING_STATUS}</Status><Currency>AUD</Currency></AddServiceReply>"
    )
}

fn button_details() -> String {
    let mut xml = String::from("<GetServiceButtonDetailsReply><Countries>");
    for country in COUNTRIES {
        let _ = write!(xml, "<Country><CountryName>{country}</CountryName></Country>");
    }
    xml.push_str("</Countries><LocalityDescriptions>");
    for locality in LOCALITIES {
        let _ = write!(xml, "<LocalityDescription>{locality}</LocalityDescription>");
    }
    xml.push_str("</LocalityDescriptions><ClassDescriptions>");
    for class in CLASSES {
        let _ = write!(xml, "<ClassDescription>{class}</ClassDescription>");
    }
    xml.push_str("</ClassDescriptions></GetServiceButtonDetailsReply>");
    xml
}
