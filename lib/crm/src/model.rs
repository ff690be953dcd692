//! CRM records as the conversation sees them.
//!
//! Only the fields the bot displays or passes back to the CRM are modelled.
//! Field names follow the CRM's REST payloads; task payloads come back in
//! camel case from some methods and upper case from others, hence the aliases.

use deal_courier_core::{CrmUserId, DealId, TaskId};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A CRM user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmUser {
    #[serde(rename = "ID")]
    pub id: CrmUserId,
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "LAST_NAME", default)]
    pub last_name: String,
}

impl CrmUser {
    /// Returns "Name LastName", skipping empty parts.
    #[must_use]
    pub fn display_name(&self) -> String {
        [self.name.as_str(), self.last_name.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A CRM deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    #[serde(rename = "ID")]
    pub id: DealId,
    #[serde(rename = "TITLE", default)]
    pub title: String,
    #[serde(rename = "TYPE_ID", default)]
    pub type_id: Option<String>,
    #[serde(rename = "CATEGORY_ID", default)]
    pub category_id: Option<String>,
    #[serde(rename = "STAGE_ID", default)]
    pub stage_id: String,
}

impl Deal {
    /// Returns the pipeline stage of this deal.
    #[must_use]
    pub fn stage(&self) -> DealStage<'_> {
        DealStage::from_id(&self.stage_id)
    }
}

/// Stage of the sales pipeline a deal is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealStage<'a> {
    New,
    Preparation,
    GetDecision,
    PrepaymentInvoice,
    Executing,
    /// A stage this build does not know a label for.
    Other(&'a str),
}

impl<'a> DealStage<'a> {
    /// Maps a CRM stage id to a stage.
    #[must_use]
    pub fn from_id(id: &'a str) -> Self {
        match id {
            "C1:NEW" => Self::New,
            "C1:PREPARATION" => Self::Preparation,
            "C1:9" => Self::GetDecision,
            "C1:PREPAYMENT_INVOICE" => Self::PrepaymentInvoice,
            "C1:EXECUTING" => Self::Executing,
            other => Self::Other(other),
        }
    }

    /// Human-readable label; unknown stages show their raw id.
    #[must_use]
    pub fn label(&self) -> &'a str {
        match *self {
            Self::New => "New deal",
            Self::Preparation => "Make an offer",
            Self::GetDecision => "Get a decision",
            Self::PrepaymentInvoice => "Collect the questionnaire",
            Self::Executing => "Get the contract",
            Self::Other(id) => id,
        }
    }
}

impl fmt::Display for DealStage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of a CRM task, as the numeric code the CRM uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskStatus {
    #[default]
    New,
    Pending,
    InProgress,
    SupposedlyCompleted,
    Completed,
    Deferred,
    Declined,
    Unknown(u8),
}

impl TaskStatus {
    /// Maps a CRM status code.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::New,
            2 => Self::Pending,
            3 => Self::InProgress,
            4 => Self::SupposedlyCompleted,
            5 => Self::Completed,
            6 => Self::Deferred,
            7 => Self::Declined,
            other => Self::Unknown(other),
        }
    }

    /// Returns the CRM status code.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::New => 1,
            Self::Pending => 2,
            Self::InProgress => 3,
            Self::SupposedlyCompleted => 4,
            Self::Completed => 5,
            Self::Deferred => 6,
            Self::Declined => 7,
            Self::Unknown(code) => *code,
        }
    }

    /// Returns true if the task no longer needs attention.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Declined)
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The CRM sends statuses as either "2" or 2.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u8),
            Text(String),
        }

        let code = match Raw::deserialize(deserializer)? {
            Raw::Number(code) => code,
            Raw::Text(text) => text.trim().parse::<u8>().map_err(de::Error::custom)?,
        };
        Ok(Self::from_code(code))
    }
}

/// A CRM task attached to a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "ID", alias = "id")]
    pub id: TaskId,
    #[serde(rename = "TITLE", alias = "title", default)]
    pub title: String,
    #[serde(rename = "STATUS", alias = "status", default)]
    pub status: TaskStatus,
}
