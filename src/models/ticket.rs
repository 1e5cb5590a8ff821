use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    WaitingOnClient,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::WaitingOnClient,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::WaitingOnClient => "waiting_on_client",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "In progress",
            TicketStatus::WaitingOnClient => "Waiting on client",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Closed => "Closed",
        }
    }

    /// Resolved and closed tickets no longer count as open work.
    pub fn is_finished(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }

    /// Status a ticket moves to after a reply, if it changes at all.
    pub fn after_reply(&self, by_staff: bool, internal: bool) -> Option<TicketStatus> {
        if internal {
            return None;
        }
        match (by_staff, self) {
            (false, TicketStatus::Resolved | TicketStatus::Closed | TicketStatus::WaitingOnClient) => {
                Some(TicketStatus::Open)
            }
            (true, TicketStatus::Open | TicketStatus::InProgress) => Some(TicketStatus::WaitingOnClient),
            _ => None,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| AppError::Validation(format!("Unknown ticket status: {}", s)))
    }
}

impl TryFrom<String> for TicketStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl TicketPriority {
    pub const ALL: [TicketPriority; 4] = [
        TicketPriority::Low,
        TicketPriority::Normal,
        TicketPriority::High,
        TicketPriority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Normal => "normal",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TicketPriority::Low => "Low",
            TicketPriority::Normal => "Normal",
            TicketPriority::High => "High",
            TicketPriority::Urgent => "Urgent",
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketPriority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketPriority::ALL
            .into_iter()
            .find(|priority| priority.as_str() == s.trim())
            .ok_or_else(|| AppError::Validation(format!("Unknown ticket priority: {}", s)))
    }
}

impl TryFrom<String> for TicketPriority {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_reply_reopens_finished_ticket() {
        assert_eq!(TicketStatus::Resolved.after_reply(false, false), Some(TicketStatus::Open));
        assert_eq!(TicketStatus::Closed.after_reply(false, false), Some(TicketStatus::Open));
        assert_eq!(TicketStatus::WaitingOnClient.after_reply(false, false), Some(TicketStatus::Open));
        assert_eq!(TicketStatus::Open.after_reply(false, false), None);
    }

    #[test]
    fn test_staff_reply_waits_on_client() {
        assert_eq!(TicketStatus::Open.after_reply(true, false), Some(TicketStatus::WaitingOnClient));
        assert_eq!(TicketStatus::InProgress.after_reply(true, false), Some(TicketStatus::WaitingOnClient));
        assert_eq!(TicketStatus::Closed.after_reply(true, false), None);
    }

    #[test]
    fn test_internal_note_never_changes_status() {
        for status in TicketStatus::ALL {
            assert_eq!(status.after_reply(true, true), None);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_values() {
        assert_eq!("waiting_on_client".parse::<TicketStatus>().unwrap(), TicketStatus::WaitingOnClient);
        assert!("pending".parse::<TicketStatus>().is_err());
        assert_eq!("urgent".parse::<TicketPriority>().unwrap(), TicketPriority::Urgent);
        assert!("critical".parse::<TicketPriority>().is_err());
    }
}
