//! Visit reschedule negotiation.
//!
//! The owner proposes a new time, the tenant accepts or declines it.
//! `RescheduleStatus` is independent of the free-text visit status.
//! A new proposal overwrites a pending one and proposals never expire.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wire format emitted for every visit date-time.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const ACCEPTED_INPUT_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RescheduleError {
    #[error("Invalid date-time `{0}` (expected YYYY-MM-DDTHH:MM[:SS])")]
    InvalidDateTime(String),

    #[error("No reschedule proposal to accept")]
    NoProposal,

    #[error("Unknown decision `{0}` (expected ACCEPTED or DECLINED)")]
    UnknownDecision(String),

    #[error("Unknown reschedule status `{0}`")]
    UnknownStatus(String),
}

/// Parse a local date-time, with or without seconds.
pub fn parse_date_time(input: &str) -> Result<NaiveDateTime, RescheduleError> {
    let trimmed = input.trim();
    ACCEPTED_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| RescheduleError::InvalidDateTime(input.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RescheduleStatus {
    #[default]
    None,
    Requested,
    Accepted,
    Declined,
}

impl RescheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RescheduleStatus::None => "NONE",
            RescheduleStatus::Requested => "REQUESTED",
            RescheduleStatus::Accepted => "ACCEPTED",
            RescheduleStatus::Declined => "DECLINED",
        }
    }
}

impl fmt::Display for RescheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RescheduleStatus {
    type Err = RescheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" | "" => Ok(RescheduleStatus::None),
            "REQUESTED" => Ok(RescheduleStatus::Requested),
            "ACCEPTED" => Ok(RescheduleStatus::Accepted),
            "DECLINED" => Ok(RescheduleStatus::Declined),
            other => Err(RescheduleError::UnknownStatus(other.to_string())),
        }
    }
}

/// Tenant's answer to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
}

impl FromStr for Decision {
    type Err = RescheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCEPTED" => Ok(Decision::Accept),
            "DECLINED" => Ok(Decision::Decline),
            _ => Err(RescheduleError::UnknownDecision(s.to_string())),
        }
    }
}

/// The scheduling fields of a visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub visit_date_time: NaiveDateTime,
    pub proposed_date_time: Option<NaiveDateTime>,
    pub status: RescheduleStatus,
}

impl Schedule {
    pub fn new(visit_date_time: NaiveDateTime) -> Self {
        Self {
            visit_date_time,
            proposed_date_time: None,
            status: RescheduleStatus::None,
        }
    }

    /// Owner proposes `proposed`. Allowed from any state.
    pub fn request(&mut self, proposed: NaiveDateTime) {
        self.proposed_date_time = Some(proposed);
        self.status = RescheduleStatus::Requested;
    }

    /// Tenant decides. On error the schedule is left untouched.
    pub fn decide(&mut self, decision: Decision) -> Result<(), RescheduleError> {
        match decision {
            Decision::Accept => {
                let proposed = self.proposed_date_time.ok_or(RescheduleError::NoProposal)?;
                self.visit_date_time = proposed;
                self.proposed_date_time = None;
                self.status = RescheduleStatus::Accepted;
            }
            Decision::Decline => {
                self.proposed_date_time = None;
                self.status = RescheduleStatus::Declined;
            }
        }
        Ok(())
    }
}
