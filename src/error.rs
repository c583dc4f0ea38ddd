use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// Longest slice of offending input carried by a parse error.
const FRAGMENT_LIMIT: usize = 160;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: {0} must be set")]
    Missing(&'static str),

    #[error("Invalid configuration for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

// Classified partner fault, keyed by the numeric prefix of the partner's error text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartnerErrorCode {
    General,
    MissingInput,
    IllegalInput,
    Communications,
    BookingNotFound,
    AgentAuthFailed,
    OptionNotFound,
    Other(String),
}

impl PartnerErrorCode {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "1000" => Self::General,
            "1001" => Self::MissingInput,
            "1002" => Self::IllegalInput,
            "1003" => Self::Communications,
            "1050" => Self::BookingNotFound,
            "1051" => Self::AgentAuthFailed,
            "1052" => Self::OptionNotFound,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::General => "1000",
            Self::MissingInput => "1001",
            Self::IllegalInput => "1002",
            Self::Communications => "1003",
            Self::BookingNotFound => "1050",
            Self::AgentAuthFailed => "1051",
            Self::OptionNotFound => "1052",
            Self::Other(code) => code,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::General => "general partner error",
            Self::MissingInput => "required input missing",
            Self::IllegalInput => "illegal input value",
            Self::Communications => "partner communications failure",
            Self::BookingNotFound => "booking not found",
            Self::AgentAuthFailed => "agent authentication failed",
            Self::OptionNotFound => "option not found",
            Self::Other(_) => "unclassified partner error",
        }
    }
}

impl fmt::Display for PartnerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Partner error {code}: {message}")]
    Partner {
        code: PartnerErrorCode,
        message: String,
    },

    #[error("Parse error: {message} (near {fragment:?})")]
    Parse { message: String, fragment: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    pub fn parse(message: impl Into<String>, fragment: &str) -> Self {
        Error::Parse {
            message: message.into(),
            fragment: truncate(fragment, FRAGMENT_LIMIT).to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1051", PartnerErrorCode::AgentAuthFailed)]
    #[test_case(" 1052 ", PartnerErrorCode::OptionNotFound)]
    #[test_case("1000", PartnerErrorCode::General)]
    #[test_case("2042", PartnerErrorCode::Other("2042".into()))]
    fn test_partner_code_classification(raw: &str, expected: PartnerErrorCode) {
        assert_eq!(PartnerErrorCode::from_code(raw), expected);
    }

    #[test]
    fn test_parse_error_fragment_is_bounded() {
        let long = "é".repeat(200);
        match Error::parse("bad", &long) {
            Error::Parse { fragment, .. } => {
                assert!(fragment.len() <= FRAGMENT_LIMIT);
                assert!(fragment.chars().all(|c| c == 'é'));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_config_error_names_variable() {
        let err: Error = ConfigError::Missing("TOURPLAN_PASSWORD").into();
        assert!(err.to_string().contains("TOURPLAN_PASSWORD"));
    }
}
