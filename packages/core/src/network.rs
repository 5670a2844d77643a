//! Network and provider records plus the data-layer contract the jobs rely on.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    Active,
    Inactive,
}

impl NetworkState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(NetworkState::Active),
            "inactive" => Some(NetworkState::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkState::Active => "active",
            NetworkState::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for NetworkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub network_type: Option<String>,
    pub state: NetworkState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User-supplied fields for create and update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    pub name: Option<String>,
    pub network_type: Option<String>,
    pub state: Option<String>,
}

impl NetworkParams {
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            network_type: None,
            state: Some(state.into()),
        }
    }
}

impl Network {
    /// Build a new network from params.
    ///
    /// `state` is validated exactly as given, so `"active\n"` is rejected.
    pub fn build(params: NetworkParams) -> Result<Self, DataError> {
        let state = validate_state(params.state.as_deref())?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: params.name.unwrap_or_default(),
            network_type: params.network_type,
            state,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply params to an existing network, validating the result.
    pub fn apply(&self, params: NetworkParams) -> Result<Self, DataError> {
        let state = match params.state.as_deref() {
            Some(raw) => validate_state(Some(raw))?,
            None => self.state,
        };
        Ok(Self {
            id: self.id,
            name: params.name.unwrap_or_else(|| self.name.clone()),
            network_type: params.network_type.or_else(|| self.network_type.clone()),
            state,
            created_at: self.created_at,
            updated_at: Utc::now(),
        })
    }
}

fn validate_state(state: Option<&str>) -> Result<NetworkState, DataError> {
    state
        .and_then(NetworkState::parse)
        .ok_or_else(|| DataError::invalid("state", "is not included in the list"))
}

/// A provider offering services on networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub licensed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(name: impl Into<String>) -> Result<Self, DataError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DataError::invalid("name", "can't be blank"));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description: None,
            website_url: None,
            logo_url: None,
            licensed: false,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Join record linking a provider to a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub network_id: Uuid,
    pub provider_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut chars = self.field.chars();
        match chars.next() {
            Some(first) => write!(
                f,
                "{}{} {}",
                first.to_uppercase(),
                chars.as_str(),
                self.message
            ),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors from the data layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Data backend error: {0}")]
    Backend(String),
}

impl DataError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        DataError::Validation(vec![FieldError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn network_not_found(id: Uuid) -> Self {
        DataError::NotFound {
            entity: "Network",
            id: id.to_string(),
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Data-layer operations on networks.
pub trait NetworkStore: Send + Sync + 'static {
    fn find(&self, id: Uuid) -> impl Future<Output = Result<Network, DataError>> + Send;

    fn all(&self) -> impl Future<Output = Result<Vec<Network>, DataError>> + Send;

    /// One page of networks ordered by creation time. Pages start at 1.
    fn page(
        &self,
        page: usize,
        per_page: usize,
    ) -> impl Future<Output = Result<Vec<Network>, DataError>> + Send;

    fn count(&self) -> impl Future<Output = Result<u64, DataError>> + Send;

    fn create(
        &self,
        params: NetworkParams,
    ) -> impl Future<Output = Result<Network, DataError>> + Send;

    fn update(
        &self,
        id: Uuid,
        params: NetworkParams,
    ) -> impl Future<Output = Result<Network, DataError>> + Send;

    fn delete(&self, id: Uuid) -> impl Future<Output = Result<(), DataError>> + Send;
}
