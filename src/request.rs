// Request documents: prolog, DOCTYPE, and <Request> around one operation
// element. Body struct field order is the DTD element order.

use crate::calendar::CalendarDate;
use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::model::{non_blank, BookingRequest, ButtonName, Occupancy, SearchCriteria};
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_DTD: &str = "hostConnect_5_05_000.dtd";

const INFO_SEARCH: &str = "GS";
const INFO_PRICING: &str = "GDMA";
const INFO_DETAIL: &str = "GMFTD";
const DEFAULT_RATE_ID: &str = "Default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    OptionInfo,
    Pricing,
    Booking,
    AgentInfo,
    ButtonDetails,
}

impl Operation {
    pub fn element(self) -> &'static str {
        match self {
            Operation::OptionInfo | Operation::Pricing => "OptionInfoRequest",
            Operation::Booking => "AddServiceRequest",
            Operation::AgentInfo => "AgentInfoRequest",
            Operation::ButtonDetails => "GetServiceButtonDetailsRequest",
        }
    }

    // Runs on the short timeout
    pub fn is_probe(self) -> bool {
        matches!(self, Operation::AgentInfo)
    }
}

// Enough context for the mock tier to answer plausibly
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockHints {
    pub product_code: Option<String>,
    pub button: Option<String>,
    pub location: Option<String>,
    pub window: Option<(CalendarDate, CalendarDate)>,
    pub guest_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub operation: Operation,
    pub body: String,
    pub hints: MockHints,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OptionInfoBody<'a> {
    #[serde(rename = "AgentID")]
    agent_id: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    opt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    button_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_name: Option<&'a str>,
    info: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_configs: Option<RoomConfigs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_convert: Option<&'static str>,
}

#[derive(Serialize)]
struct RoomConfigs {
    #[serde(rename = "RoomConfig")]
    configs: Vec<RoomConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RoomConfig {
    adults: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<u32>,
    room_type: &'static str,
}

impl From<&Occupancy> for RoomConfigs {
    fn from(occupancy: &Occupancy) -> Self {
        RoomConfigs {
            configs: vec![RoomConfig {
                adults: occupancy.adults,
                children: (occupancy.children > 0).then_some(occupancy.children),
                room_type: occupancy.room_type.code(),
            }],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AddServiceBody<'a> {
    #[serde(rename = "AgentID")]
    agent_id: &'a str,
    password: &'a str,
    new_booking_info: NewBookingInfo<'a>,
    opt: &'a str,
    rate_id: &'a str,
    date_from: String,
    #[serde(rename = "SCUqty")]
    scu_qty: u32,
    room_configs: RoomConfigs,
    #[serde(rename = "puRemark", skip_serializing_if = "Option::is_none")]
    remark: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct NewBookingInfo<'a> {
    name: &'a str,
    #[serde(rename = "QB")]
    quote_or_book: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mobile: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentInfoBody<'a> {
    #[serde(rename = "AgentID")]
    agent_id: &'a str,
    password: &'a str,
    return_account_info: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ButtonDetailsBody<'a> {
    #[serde(rename = "AgentID")]
    agent_id: &'a str,
    password: &'a str,
    button_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_name: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    credentials: Credentials,
    dtd: String,
}

impl RequestBuilder {
    pub fn new(credentials: Credentials, dtd: impl Into<String>) -> Self {
        Self {
            credentials,
            dtd: dtd.into(),
        }
    }

    pub fn search(&self, criteria: &SearchCriteria) -> Result<PreparedRequest> {
        let location = criteria
            .location()
            .ok_or_else(|| Error::validation("search needs a destination or country"))?;
        let (from, to) = window(criteria.date_from, criteria.date_to)?;
        check_occupancy(&criteria.occupancy)?;
        let button = non_blank(Some(criteria.button.as_str()));

        let body = OptionInfoBody {
            agent_id: &self.credentials.agent_id,
            password: self.credentials.password(),
            opt: None,
            button_name: button,
            destination_name: Some(location),
            info: INFO_SEARCH,
            date_from: Some(from.to_string()),
            date_to: Some(to.to_string()),
            room_configs: Some(RoomConfigs::from(&criteria.occupancy)),
            rate_convert: Some("Y"),
        };
        let hints = MockHints {
            button: button.map(str::to_string),
            location: Some(location.to_string()),
            window: Some((from, to)),
            ..MockHints::default()
        };
        self.prepare(Operation::OptionInfo, &body, hints)
    }

    pub fn pricing(
        &self,
        product_code: &str,
        from: CalendarDate,
        to: CalendarDate,
        occupancy: &Occupancy,
    ) -> Result<PreparedRequest> {
        let code = product_code_of(product_code)?;
        let (from, to) = window(Some(from), Some(to))?;
        check_occupancy(occupancy)?;

        let body = OptionInfoBody {
            agent_id: &self.credentials.agent_id,
            password: self.credentials.password(),
            opt: Some(code),
            button_name: None,
            destination_name: None,
            info: INFO_PRICING,
            date_from: Some(from.to_string()),
            date_to: Some(to.to_string()),
            room_configs: Some(RoomConfigs::from(occupancy)),
            rate_convert: Some("Y"),
        };
        let hints = MockHints {
            product_code: Some(code.to_string()),
            window: Some((from, to)),
            ..MockHints::default()
        };
        self.prepare(Operation::Pricing, &body, hints)
    }

    pub fn product_detail(&self, product_code: &str) -> Result<PreparedRequest> {
        let code = product_code_of(product_code)?;
        let body = OptionInfoBody {
            agent_id: &self.credentials.agent_id,
            password: self.credentials.password(),
            opt: Some(code),
            button_name: None,
            destination_name: None,
            info: INFO_DETAIL,
            date_from: None,
            date_to: None,
            room_configs: None,
            rate_convert: None,
        };
        let hints = MockHints {
            product_code: Some(code.to_string()),
            ..MockHints::default()
        };
        self.prepare(Operation::OptionInfo, &body, hints)
    }

    pub fn booking(&self, request: &BookingRequest) -> Result<PreparedRequest> {
        let code = product_code_of(&request.product_code)?;
        let name = non_blank(Some(&request.guest_name))
            .ok_or_else(|| Error::validation("booking needs a guest name"))?;
        check_occupancy(&request.occupancy)?;

        let body = AddServiceBody {
            agent_id: &self.credentials.agent_id,
            password: self.credentials.password(),
            new_booking_info: NewBookingInfo {
                name,
                quote_or_book: if request.quote_only { "Q" } else { "B" },
                email: non_blank(request.email.as_deref()),
                mobile: non_blank(request.mobile.as_deref()),
            },
            opt: code,
            rate_id: non_blank(request.rate_id.as_deref()).unwrap_or(DEFAULT_RATE_ID),
            date_from: request.date_from.to_string(),
            scu_qty: 1,
            room_configs: RoomConfigs::from(&request.occupancy),
            remark: non_blank(request.remark.as_deref()),
        };
        let hints = MockHints {
            product_code: Some(code.to_string()),
            window: Some((request.date_from, request.date_from)),
            guest_name: Some(name.to_string()),
            ..MockHints::default()
        };
        self.prepare(Operation::Booking, &body, hints)
    }

    pub fn agent_info(&self) -> Result<PreparedRequest> {
        let body = AgentInfoBody {
            agent_id: &self.credentials.agent_id,
            password: self.credentials.password(),
            return_account_info: "Y",
        };
        self.prepare(Operation::AgentInfo, &body, MockHints::default())
    }

    pub fn button_details(
        &self,
        button: &ButtonName,
        destination: Option<&str>,
    ) -> Result<PreparedRequest> {
        let button_name = non_blank(Some(button.as_str()))
            .ok_or_else(|| Error::validation("button details need a button name"))?;
        let body = ButtonDetailsBody {
            agent_id: &self.credentials.agent_id,
            password: self.credentials.password(),
            button_name,
            destination_name: non_blank(destination),
        };
        let hints = MockHints {
            button: Some(button_name.to_string()),
            location: non_blank(destination).map(str::to_string),
            ..MockHints::default()
        };
        self.prepare(Operation::ButtonDetails, &body, hints)
    }

    fn prepare<T: Serialize>(
        &self,
        operation: Operation,
        body: &T,
        hints: MockHints,
    ) -> Result<PreparedRequest> {
        let inner = quick_xml::se::to_string_with_root(operation.element(), body)
            .map_err(|e| Error::validation(format!("cannot render {}: {e}", operation.element())))?;
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE Request SYSTEM \"{}\">\n<Request>{}</Request>",
            self.dtd, inner
        );
        debug!(operation = operation.element(), bytes = body.len(), "rendered request");
        Ok(PreparedRequest {
            operation,
            body,
            hints,
        })
    }
}

fn product_code_of(code: &str) -> Result<&str> {
    non_blank(Some(code)).ok_or_else(|| Error::validation("product code is required"))
}

fn window(
    from: Option<CalendarDate>,
    to: Option<CalendarDate>,
) -> Result<(CalendarDate, CalendarDate)> {
    match (from, to) {
        (Some(from), Some(to)) if from <= to => Ok((from, to)),
        (Some(from), Some(to)) => Err(Error::validation(format!(
            "date window is inverted: {from} is after {to}"
        ))),
        _ => Err(Error::validation("a DateFrom/DateTo window is required")),
    }
}

fn check_occupancy(occupancy: &Occupancy) -> Result<()> {
    if occupancy.adults == 0 {
        return Err(Error::validation("at least one adult is required"));
    }
    Ok(())
}
