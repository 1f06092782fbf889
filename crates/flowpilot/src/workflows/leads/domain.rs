use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::scoring::{QuestionScore, RoutingThresholds, RuleSet};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

identifier!(
    /// Tenant identifier; every read and write is scoped by it.
    CompanyId
);
identifier!(FormId);
identifier!(
    /// Stable question key referenced by answer maps and scoring rules.
    QuestionId
);
identifier!(LeadId);

impl LeadId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl FormId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Raw answers keyed by question.
pub type AnswerMap = BTreeMap<QuestionId, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    ShortText,
    LongText,
    Email,
    Phone,
    Number,
    SingleSelect,
    MultiSelect,
    Date,
    File,
    Address,
}

impl QuestionKind {
    /// Kinds whose answers are picked from the option list.
    pub const fn is_choice(self) -> bool {
        matches!(self, Self::SingleSelect | Self::MultiSelect)
    }

    /// Kinds whose free text can plausibly hold a person's name.
    pub const fn may_hold_name(self) -> bool {
        matches!(self, Self::ShortText | Self::LongText)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub label: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Tenant-configured questionnaire with optional scoring rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub company_id: CompanyId,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub scoring: RuleSet,
    #[serde(default)]
    pub routing: RoutingThresholds,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Form {
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|question| &question.id == id)
    }
}

/// Tenant record consulted by the quota guard and the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    /// Subscription plan identifier; absent while on trial.
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFields {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ContactFields {
    /// Fill any field still missing from `other`, keeping values already present.
    pub fn fill_missing(&mut self, other: ContactFields) {
        if self.name.is_none() {
            self.name = other.name;
        }
        if self.email.is_none() {
            self.email = other.email;
        }
        if self.phone.is_none() {
            self.phone = other.phone;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.email.is_some() && self.phone.is_some()
    }

    pub(crate) fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        }

        Self {
            name: clean(self.name),
            email: clean(self.email),
            phone: clean(self.phone),
        }
    }
}

/// Lifecycle status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Reviewed,
    Accepted,
    Rejected,
    InProgress,
    Archived,
}

impl LeadStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeadStatus::New => "NEW",
            LeadStatus::Reviewed => "REVIEWED",
            LeadStatus::Accepted => "ACCEPTED",
            LeadStatus::Rejected => "REJECTED",
            LeadStatus::InProgress => "IN_PROGRESS",
            LeadStatus::Archived => "ARCHIVED",
        }
    }

    /// Statuses a dashboard user may set. Every status may be left again.
    pub const fn is_manual_target(self) -> bool {
        matches!(
            self,
            LeadStatus::Accepted
                | LeadStatus::Rejected
                | LeadStatus::InProgress
                | LeadStatus::Archived
        )
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Salesman responsible for a lead, set by the assignment heuristic or from the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignee: Option<String>,
    pub confidence: u8,
    pub reason: String,
}

impl Assignment {
    pub fn unassigned(reason: impl Into<String>) -> Self {
        Self {
            assignee: None,
            confidence: 0,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadNote {
    #[serde(default)]
    pub author: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A single scored submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub company_id: CompanyId,
    pub form_id: FormId,
    pub contact: ContactFields,
    pub answers: AnswerMap,
    pub source: String,
    pub score: Option<u8>,
    #[serde(default)]
    pub breakdown: BTreeMap<QuestionId, QuestionScore>,
    pub status: LeadStatus,
    #[serde(default)]
    pub assignment: Option<Assignment>,
    #[serde(default)]
    pub notes: Vec<LeadNote>,
    #[serde(default)]
    pub converted: bool,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn assignee(&self) -> Option<&str> {
        self.assignment
            .as_ref()
            .and_then(|assignment| assignment.assignee.as_deref())
    }
}

/// Public submission after transport decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub answers: AnswerMap,
    #[serde(default)]
    pub contact: ContactFields,
    #[serde(default)]
    pub source: Option<String>,
}

/// Authenticated caller of dashboard operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub company_id: CompanyId,
    pub user_id: Option<String>,
}

impl Principal {
    pub fn for_company(company_id: impl Into<String>) -> Self {
        Self {
            company_id: CompanyId(company_id.into()),
            user_id: None,
        }
    }
}

/// Resources capped by subscription plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Leads,
    Forms,
}

impl ResourceKind {
    pub const fn label(self) -> &'static str {
        match self {
            ResourceKind::Leads => "leads",
            ResourceKind::Forms => "forms",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leads" => Ok(ResourceKind::Leads),
            "forms" => Ok(ResourceKind::Forms),
            other => Err(format!("unknown resource '{other}'")),
        }
    }
}
