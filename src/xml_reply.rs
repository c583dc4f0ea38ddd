use serde::Deserialize;

// Wire shapes of the partner's reply documents. Every field is optional at this
// level; required-ness is enforced when converting into the domain model.

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlReply {
    pub option_info_reply: Option<XmlOptionInfoReply>,
    pub add_service_reply: Option<XmlAddServiceReply>,
    pub agent_info_reply: Option<XmlAgentInfoReply>,
    pub get_service_button_details_reply: Option<XmlButtonDetailsReply>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlOptionInfoReply {
    #[serde(rename = "Option")]
    pub options: Vec<XmlOption>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlOption {
    pub opt: String,
    pub opt_general: Option<XmlOptGeneral>,
    pub opt_avail: Option<String>,
    pub opt_date_ranges: Option<XmlOptDateRanges>,
    pub opt_stay_results: Option<XmlOptStayResults>,
    pub option_notes: Option<XmlOptionNotes>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlOptGeneral {
    pub description: Option<String>,
    pub supplier_name: Option<String>,
    pub comment: Option<String>,
    pub locality_description: Option<String>,
    pub class_description: Option<String>,
    pub button_name: Option<String>,
    pub periods: Option<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlOptDateRanges {
    #[serde(rename = "OptDateRange")]
    pub ranges: Vec<XmlOptDateRange>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlOptDateRange {
    pub date_from: String,
    pub date_to: String,
    pub currency: Option<String>,
    pub rate_sets: Option<XmlRateSets>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlRateSets {
    #[serde(rename = "RateSet")]
    pub sets: Vec<XmlRateSet>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlRateSet {
    pub rate_name: Option<String>,
    pub applies_days_of_week: Option<XmlDaysOfWeek>,
    pub opt_rate: Option<XmlOptRate>,
}

// Each attribute is "Y" when the rate applies on that day
#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlDaysOfWeek {
    #[serde(rename = "@Mon")]
    pub mon: Option<String>,
    #[serde(rename = "@Tues")]
    pub tues: Option<String>,
    #[serde(rename = "@Weds")]
    pub weds: Option<String>,
    #[serde(rename = "@Thurs")]
    pub thurs: Option<String>,
    #[serde(rename = "@Fri")]
    pub fri: Option<String>,
    #[serde(rename = "@Sat")]
    pub sat: Option<String>,
    #[serde(rename = "@Sun")]
    pub sun: Option<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlOptRate {
    pub room_rates: Option<XmlRoomRates>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlRoomRates {
    pub single_rate: Option<String>,
    pub double_rate: Option<String>,
    pub twin_rate: Option<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlOptStayResults {
    pub currency: Option<String>,
    pub total_price: Option<String>,
    pub agent_price: Option<String>,
    pub rate_name: Option<String>,
    pub rate_set: Option<XmlStayRateSet>,
}

// Per-night pricing: RateSet/RateStays/RateStay/StayPays/StayPay
#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlStayRateSet {
    pub rate_stays: Option<XmlRateStays>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlRateStays {
    #[serde(rename = "RateStay")]
    pub stays: Vec<XmlRateStay>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlRateStay {
    pub rate_name: Option<String>,
    pub stay_pays: Option<XmlStayPays>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlStayPays {
    #[serde(rename = "StayPay")]
    pub pays: Vec<XmlStayPay>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlStayPay {
    pub date: String,
    pub pay: Option<String>,
    pub available: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlOptionNotes {
    #[serde(rename = "OptionNote")]
    pub notes: Vec<XmlOptionNote>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlOptionNote {
    pub note_category: Option<String>,
    pub note_text: Option<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlAddServiceReply {
    pub booking_id: Option<String>,
    #[serde(rename = "Ref")]
    pub reference: Option<String>,
    pub status: Option<String>,
    pub currency: Option<String>,
    pub total_price: Option<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlAgentInfoReply {
    pub name: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlButtonDetailsReply {
    pub countries: Option<XmlCountries>,
    pub locality_descriptions: Option<XmlLocalityDescriptions>,
    pub class_descriptions: Option<XmlClassDescriptions>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlLocalityDescriptions {
    #[serde(rename = "LocalityDescription")]
    pub items: Vec<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlClassDescriptions {
    #[serde(rename = "ClassDescription")]
    pub items: Vec<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default)]
pub struct XmlCountries {
    #[serde(rename = "Country")]
    pub items: Vec<XmlCountry>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlCountry {
    pub country_name: Option<String>,
}
