//! Client model for invoicing-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use service_core::error::field_error;
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

/// Maximum length of a client name, in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Number of digits in a tax identifier.
pub const TAX_ID_LENGTH: usize = 14;

/// A billable client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub name: String,
    pub email: String,
    pub tax_id: Option<String>,
    pub creation_date: NaiveDate,
    pub created_utc: DateTime<Utc>,
}

/// Client detail view with its invoicing aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSummary {
    #[serde(flatten)]
    pub client: Client,
    pub invoice_count: i64,
    pub revenue: Decimal,
    pub last_invoice_date: Option<NaiveDate>,
}

/// Input for creating a client.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateClient {
    #[validate(custom(function = "validate_name"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(custom(function = "validate_tax_id"))]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub creation_date: Option<NaiveDate>,
}

impl CreateClient {
    /// Trims text fields and lowercases the email; a blank tax ID means
    /// "no tax ID".
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.email = normalize_email(&self.email);
        self.tax_id = normalize_tax_id(self.tax_id);
        self
    }
}

/// Input for updating a client. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateClient {
    #[serde(default)]
    #[validate(custom(function = "validate_name"))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    /// Absent keeps the tax ID; `null` or a blank string removes it.
    #[serde(default, deserialize_with = "present")]
    pub tax_id: Option<Option<String>>,
    #[serde(default)]
    pub creation_date: Option<NaiveDate>,
}

impl UpdateClient {
    pub fn normalized(mut self) -> Self {
        self.name = self.name.map(|n| n.trim().to_string());
        self.email = self.email.as_deref().map(normalize_email);
        self.tax_id = self.tax_id.map(normalize_tax_id);
        self
    }

    /// Field validation plus the tax ID rule, which the derive cannot reach
    /// through the nested option.
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        if let Some(Some(tax_id)) = &self.tax_id {
            if let Err(err) = validate_tax_id(tax_id) {
                errors.add("tax_id", err);
            }
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The new tax ID, when one is being set (not kept, not removed).
    pub fn new_tax_id(&self) -> Option<&str> {
        self.tax_id.as_ref().and_then(|t| t.as_deref())
    }

    /// Applies the present fields onto `client`.
    pub fn apply_to(&self, client: &mut Client) {
        if let Some(name) = &self.name {
            client.name = name.clone();
        }
        if let Some(email) = &self.email {
            client.email = email.clone();
        }
        if let Some(tax_id) = &self.tax_id {
            client.tax_id = tax_id.clone();
        }
        if let Some(creation_date) = self.creation_date {
            client.creation_date = creation_date;
        }
    }
}

/// Filter parameters for listing clients.
#[derive(Debug, Clone, Default)]
pub struct ListClientsFilter {
    /// Case-insensitive substring matched against name, email and tax ID.
    pub search: Option<String>,
    pub page: super::PageRequest,
}

impl ListClientsFilter {
    pub fn matches(&self, client: &Client) -> bool {
        let Some(search) = self.search.as_deref() else {
            return true;
        };
        let needle = search.to_lowercase();
        client.name.to_lowercase().contains(&needle)
            || client.email.to_lowercase().contains(&needle)
            || client
                .tax_id
                .as_deref()
                .is_some_and(|t| t.contains(&needle))
    }
}

/// Maps a present JSON value, `null` included, to `Some`.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn normalize_tax_id(tax_id: Option<String>) -> Option<String> {
    tax_id
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(field_error("required", "Client name is required"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(field_error(
            "length",
            "Client name cannot exceed 255 characters",
        ));
    }
    Ok(())
}

pub fn validate_tax_id(tax_id: &str) -> Result<(), ValidationError> {
    if tax_id.len() != TAX_ID_LENGTH {
        return Err(field_error(
            "length",
            "Tax ID must contain exactly 14 digits",
        ));
    }
    if !tax_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(field_error("digits", "Tax ID must contain only digits"));
    }
    Ok(())
}
