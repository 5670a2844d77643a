//! Provider and membership repositories.

use chrono::Utc;
use dispatch_core::network::{Membership, Provider};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::network_repo::{parse_time, parse_uuid};
use crate::{Database, DbError};

const PROVIDER_FIELDS: &str =
    "provider_id, name, description, website_url, logo_url, licensed, created_at, updated_at, created_ms";

#[derive(Debug, Serialize, Deserialize)]
struct ProviderRecord {
    provider_id: String,
    name: String,
    description: Option<String>,
    website_url: Option<String>,
    logo_url: Option<String>,
    licensed: bool,
    created_at: String,
    updated_at: String,
    created_ms: i64,
}

impl From<&Provider> for ProviderRecord {
    fn from(provider: &Provider) -> Self {
        Self {
            provider_id: provider.id.to_string(),
            name: provider.name.clone(),
            description: provider.description.clone(),
            website_url: provider.website_url.clone(),
            logo_url: provider.logo_url.clone(),
            licensed: provider.licensed,
            created_at: provider.created_at.to_rfc3339(),
            updated_at: provider.updated_at.to_rfc3339(),
            created_ms: provider.created_at.timestamp_millis(),
        }
    }
}

impl TryFrom<ProviderRecord> for Provider {
    type Error = DbError;

    fn try_from(record: ProviderRecord) -> Result<Self, Self::Error> {
        Ok(Provider {
            id: parse_uuid(&record.provider_id)?,
            name: record.name,
            description: record.description,
            website_url: record.website_url,
            logo_url: record.logo_url,
            licensed: record.licensed,
            created_at: parse_time(&record.created_at)?,
            updated_at: parse_time(&record.updated_at)?,
        })
    }
}

/// Repository for providers.
#[derive(Clone)]
pub struct ProviderRepository {
    db: Database,
}

impl ProviderRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or overwrite a provider.
    pub async fn save(&self, provider: &Provider) -> Result<(), DbError> {
        let record = ProviderRecord::from(provider);
        self.db
            .client()
            .query("UPSERT type::thing('provider', $id) CONTENT $record")
            .bind(("id", record.provider_id.clone()))
            .bind(("record", record))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Provider, DbError> {
        let query = format!("SELECT {} FROM type::thing('provider', $id)", PROVIDER_FIELDS);
        let mut response = self
            .db
            .client()
            .query(&query)
            .bind(("id", id.to_string()))
            .await?;
        let record: Option<ProviderRecord> = response.take(0)?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Provider not found: {}", id)))?
            .try_into()
    }

    pub async fn list(&self) -> Result<Vec<Provider>, DbError> {
        let query = format!(
            "SELECT {} FROM provider ORDER BY created_ms ASC, provider_id ASC",
            PROVIDER_FIELDS
        );
        let mut response = self.db.client().query(&query).await?;
        let records: Vec<ProviderRecord> = response.take(0)?;
        records.into_iter().map(Provider::try_from).collect()
    }

    /// Delete a provider and its memberships.
    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        self.db
            .client()
            .query(
                r#"
                BEGIN TRANSACTION;
                DELETE membership WHERE provider_id = $id;
                DELETE type::thing('provider', $id);
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("id", id.to_string()))
            .await?
            .check()?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MembershipRecord {
    network_id: String,
    provider_id: String,
    created_at: String,
    created_ms: i64,
}

fn membership_key(network_id: Uuid, provider_id: Uuid) -> String {
    format!("{}_{}", network_id.simple(), provider_id.simple())
}

/// Repository for the network/provider join table.
#[derive(Clone)]
pub struct MembershipRepository {
    db: Database,
}

impl MembershipRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Link a provider to a network. Linking twice keeps a single membership.
    pub async fn link(&self, network_id: Uuid, provider_id: Uuid) -> Result<Membership, DbError> {
        let now = Utc::now();
        let record = MembershipRecord {
            network_id: network_id.to_string(),
            provider_id: provider_id.to_string(),
            created_at: now.to_rfc3339(),
            created_ms: now.timestamp_millis(),
        };
        self.db
            .client()
            .query("UPSERT type::thing('membership', $id) CONTENT $record")
            .bind(("id", membership_key(network_id, provider_id)))
            .bind(("record", record))
            .await?
            .check()?;

        Ok(Membership {
            network_id,
            provider_id,
            created_at: now,
        })
    }

    /// Remove a link. Returns quietly when it does not exist.
    pub async fn unlink(&self, network_id: Uuid, provider_id: Uuid) -> Result<(), DbError> {
        self.db
            .client()
            .query("DELETE type::thing('membership', $id)")
            .bind(("id", membership_key(network_id, provider_id)))
            .await?
            .check()?;
        Ok(())
    }

    /// Providers linked to a network.
    pub async fn providers_for_network(&self, network_id: Uuid) -> Result<Vec<Provider>, DbError> {
        let query = format!(
            "SELECT {} FROM provider \
             WHERE provider_id IN (SELECT VALUE provider_id FROM membership WHERE network_id = $network) \
             ORDER BY created_ms ASC, provider_id ASC",
            PROVIDER_FIELDS
        );
        let mut response = self
            .db
            .client()
            .query(&query)
            .bind(("network", network_id.to_string()))
            .await?;
        let records: Vec<ProviderRecord> = response.take(0)?;
        records.into_iter().map(Provider::try_from).collect()
    }

    /// IDs of the networks a provider is linked to.
    pub async fn network_ids_for_provider(&self, provider_id: Uuid) -> Result<Vec<Uuid>, DbError> {
        let mut response = self
            .db
            .client()
            .query("SELECT VALUE network_id FROM membership WHERE provider_id = $provider")
            .bind(("provider", provider_id.to_string()))
            .await?;
        let ids: Vec<String> = response.take(0)?;
        let mut ids = ids
            .iter()
            .map(|id| parse_uuid(id))
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort();
        Ok(ids)
    }
}
