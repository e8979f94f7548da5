use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::company::CompanySummary;
use crate::domain::drill::Drill;
use crate::errors::DomainError;

pub const MIN_COMPANY_CHARS: usize = 2;
pub const MAX_COMPANY_CHARS: usize = 100;
pub const MAX_ROLE_DESCRIPTION_CHARS: usize = 8000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: &'static str,
    pub label: &'static str,
}

pub const PREDEFINED_ROLES: &[Role] = &[
    Role { id: "backend_developer", label: "Backend Developer" },
    Role { id: "frontend_developer", label: "Frontend Developer" },
    Role { id: "fullstack_developer", label: "Full Stack Developer" },
    Role { id: "mobile_developer", label: "Mobile Developer" },
    Role { id: "devops_engineer", label: "DevOps Engineer" },
    Role { id: "data_engineer", label: "Data Engineer" },
    Role { id: "ml_engineer", label: "Machine Learning Engineer" },
    Role { id: "security_engineer", label: "Security Engineer" },
    Role { id: "qa_engineer", label: "QA Engineer" },
];

pub fn find_role(id: &str) -> Option<&'static Role> {
    PREDEFINED_ROLES.iter().find(|role| role.id == id)
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserSelectionRequest {
    pub company_name: String,
    pub role: String,
    #[serde(default)]
    pub role_description: Option<String>,
}

/// A selection that passed validation; the role is resolved to its label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserSelection {
    pub company_name: String,
    pub role: String,
    pub role_description: Option<String>,
    pub session_id: String,
}

impl UserSelectionRequest {
    pub fn validate(&self) -> Result<UserSelection, DomainError> {
        let company_name = validate_company_name(&self.company_name)?;
        let role = find_role(&self.role).ok_or_else(|| DomainError::InvalidSelection {
            field: "role",
            message: format!("Role '{}' is not valid", self.role),
        })?;
        let role_description = validate_role_description(self.role_description.as_deref())?;

        Ok(UserSelection {
            company_name,
            role: role.label.to_string(),
            role_description,
            session_id: Uuid::new_v4().to_string(),
        })
    }
}

pub fn validate_company_name(raw: &str) -> Result<String, DomainError> {
    let invalid =
        |message: &str| DomainError::InvalidSelection { field: "company_name", message: message.to_string() };

    let name = raw.trim();
    if name.is_empty() {
        return Err(invalid("Company name is required"));
    }
    let length = name.chars().count();
    if length < MIN_COMPANY_CHARS {
        return Err(invalid("Company name must be at least 2 characters"));
    }
    if length > MAX_COMPANY_CHARS {
        return Err(invalid("Company name must be at most 100 characters"));
    }
    if name.chars().any(is_emoji) {
        return Err(invalid("Company name cannot contain emojis"));
    }
    if has_repeated_symbol(name) {
        return Err(invalid("Company name cannot contain repeated symbols"));
    }
    Ok(name.to_string())
}

fn validate_role_description(raw: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(description) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_ROLE_DESCRIPTION_CHARS {
        return Err(DomainError::InvalidSelection {
            field: "role_description",
            message: "Role description must be at most 8000 characters".to_string(),
        });
    }
    Ok(Some(description.to_string()))
}

fn is_emoji(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1F600..=0x1F64F
            | 0x1F300..=0x1F5FF
            | 0x1F680..=0x1F6FF
            | 0x1F1E0..=0x1F1FF
            | 0x2702..=0x27B0
            | 0x1F900..=0x1F9FF
            | 0x1FA00..=0x1FA6F
            | 0x1FA70..=0x1FAFF
            | 0x2600..=0x26FF
    )
}

/// Three or more consecutive copies of the same symbol (not a word char or whitespace).
fn has_repeated_symbol(value: &str) -> bool {
    let mut previous: Option<char> = None;
    let mut run = 0usize;
    for ch in value.chars() {
        let symbol = !(ch.is_alphanumeric() || ch == '_' || ch.is_whitespace());
        if symbol && previous == Some(ch) {
            run += 1;
        } else {
            run = usize::from(symbol);
        }
        if run >= 3 {
            return true;
        }
        previous = Some(ch);
    }
    false
}

/// Per-session state shared by the research, drill and evaluation endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub company_name: String,
    pub role: String,
    pub role_description: Option<String>,
    pub research_summary: Option<CompanySummary>,
    pub last_feedback_summary: Option<String>,
    pub current_drill: Option<Drill>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn from_selection(selection: &UserSelection) -> Self {
        Self {
            session_id: selection.session_id.clone(),
            company_name: selection.company_name.clone(),
            role: selection.role.clone(),
            role_description: selection.role_description.clone(),
            research_summary: None,
            last_feedback_summary: None,
            current_drill: None,
            created_at: Utc::now(),
        }
    }
}
