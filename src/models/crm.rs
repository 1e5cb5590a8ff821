use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrmStatus {
    Lead,
    Active,
    Inactive,
}

impl CrmStatus {
    pub const ALL: [CrmStatus; 3] = [CrmStatus::Lead, CrmStatus::Active, CrmStatus::Inactive];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrmStatus::Lead => "lead",
            CrmStatus::Active => "active",
            CrmStatus::Inactive => "inactive",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CrmStatus::Lead => "Lead",
            CrmStatus::Active => "Active",
            CrmStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for CrmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrmStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrmStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| AppError::Validation(format!("Unknown client status: {}", s)))
    }
}

impl TryFrom<String> for CrmStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
