use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BUSINESS_HOURS_START: u8 = 9;
pub const BUSINESS_HOURS_END: u8 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Interview,
    Contractor,
    Delivery,
    Other,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interview => "interview",
            Self::Contractor => "contractor",
            Self::Delivery => "delivery",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("time must be formatted as HH:MM, got {0:?}")]
    Format(String),
    #[error("hour {0} is outside 0-23")]
    Hour(u32),
    #[error("minute {0} is outside 0-59")]
    Minute(u32),
}

/// Wall-clock time of day on a 24h clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    pub(crate) hour: u8,
    pub(crate) minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, TimeParseError> {
        if hour > 23 {
            return Err(TimeParseError::Hour(hour.into()));
        }
        if minute > 59 {
            return Err(TimeParseError::Minute(minute.into()));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    /// Hour-only comparison: 16:59 is inside, 17:00 is not.
    pub fn is_business_hours(self) -> bool {
        (BUSINESS_HOURS_START..BUSINESS_HOURS_END).contains(&self.hour)
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let format_err = || TimeParseError::Format(value.to_string());
        let (hour, minute) = value.trim().split_once(':').ok_or_else(format_err)?;

        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(hour) || hour.len() > 2 || !all_digits(minute) || minute.len() != 2 {
            return Err(format_err());
        }

        let hour = hour.parse::<u32>().map_err(|_| format_err())?;
        let minute = minute.parse::<u32>().map_err(|_| format_err())?;
        if hour > 23 {
            return Err(TimeParseError::Hour(hour));
        }
        if minute > 59 {
            return Err(TimeParseError::Minute(minute));
        }

        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRequest {
    pub visitor_id: String,
    pub purpose: Purpose,
    pub time: TimeOfDay,
    pub host: String,
    pub badge_required: bool,
    pub pre_registered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Deny,
    Review,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
            Self::Review => "review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    FrontDesk,
    Security,
    #[serde(rename = "none")]
    Unrouted,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FrontDesk => "front_desk",
            Self::Security => "security",
            Self::Unrouted => "none",
        }
    }
}

/// Outcome of the rule table for one request, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub route: Route,
    pub explanation: String,
    pub policy_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub explanation: String,
    pub model_used: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeSource {
    QrScan,
    Import,
    Gallery,
}

impl IntakeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QrScan => "qr_scan",
            Self::Import => "import",
            Self::Gallery => "gallery",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeEnvelope {
    pub source: IntakeSource,
    pub payload: VisitRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeResponse {
    pub decision: Decision,
    pub route: Route,
    pub explanation: String,
    pub policy_id: String,
    pub model_used: String,
}

impl IntakeResponse {
    pub fn compose(evaluation: Evaluation, enriched: EnrichedResult) -> Self {
        Self {
            decision: evaluation.decision,
            route: evaluation.route,
            explanation: enriched.explanation,
            policy_id: evaluation.policy_id,
            model_used: enriched.model_used,
        }
    }
}
