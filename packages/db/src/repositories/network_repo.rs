//! Network repository.

use chrono::{DateTime, Utc};
use dispatch_core::{DataError, Network, NetworkParams, NetworkState, NetworkStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Database, DbError};

const NETWORK_FIELDS: &str =
    "network_id, name, network_type, state, created_at, updated_at, created_ms";

#[derive(Debug, Serialize, Deserialize)]
struct NetworkRecord {
    network_id: String,
    name: String,
    network_type: Option<String>,
    state: String,
    created_at: String,
    updated_at: String,
    created_ms: i64,
}

pub(crate) fn parse_time(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(format!("Bad timestamp {}: {}", raw, e)))
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::Serialization(format!("Bad id {}: {}", raw, e)))
}

impl From<&Network> for NetworkRecord {
    fn from(network: &Network) -> Self {
        Self {
            network_id: network.id.to_string(),
            name: network.name.clone(),
            network_type: network.network_type.clone(),
            state: network.state.as_str().to_string(),
            created_at: network.created_at.to_rfc3339(),
            updated_at: network.updated_at.to_rfc3339(),
            created_ms: network.created_at.timestamp_millis(),
        }
    }
}

impl TryFrom<NetworkRecord> for Network {
    type Error = DbError;

    fn try_from(record: NetworkRecord) -> Result<Self, Self::Error> {
        let state = NetworkState::parse(&record.state)
            .ok_or_else(|| DbError::Serialization(format!("Bad network state: {}", record.state)))?;
        Ok(Network {
            id: parse_uuid(&record.network_id)?,
            name: record.name,
            network_type: record.network_type,
            state,
            created_at: parse_time(&record.created_at)?,
            updated_at: parse_time(&record.updated_at)?,
        })
    }
}

/// Repository for networks.
#[derive(Clone)]
pub struct NetworkRepository {
    db: Database,
}

impl NetworkRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn insert(&self, network: &Network) -> Result<(), DbError> {
        let record = NetworkRecord::from(network);
        self.db
            .client()
            .query("CREATE type::thing('network', $id) CONTENT $record")
            .bind(("id", record.network_id.clone()))
            .bind(("record", record))
            .await?
            .check()?;
        Ok(())
    }

    /// Overwrite an existing record. `UPDATE` never creates, so a record
    /// deleted since it was read comes back as `None`.
    async fn replace(&self, network: &Network) -> Result<Option<Network>, DbError> {
        let record = NetworkRecord::from(network);
        let query = format!(
            "UPDATE type::thing('network', $id) CONTENT $record RETURN {}",
            NETWORK_FIELDS
        );
        let mut response = self
            .db
            .client()
            .query(&query)
            .bind(("id", record.network_id.clone()))
            .bind(("record", record))
            .await?
            .check()?;
        let records: Vec<NetworkRecord> = response.take(0)?;
        records.into_iter().next().map(Network::try_from).transpose()
    }

    async fn select(&self, query: &str, limit: Option<(usize, usize)>) -> Result<Vec<Network>, DbError> {
        let mut request = self.db.client().query(query);
        if let Some((start, limit)) = limit {
            request = request
                .bind(("start", start as i64))
                .bind(("limit", limit as i64));
        }
        let mut response = request.await?;
        let records: Vec<NetworkRecord> = response.take(0)?;
        records.into_iter().map(Network::try_from).collect()
    }
}

impl NetworkStore for NetworkRepository {
    async fn find(&self, id: Uuid) -> Result<Network, DataError> {
        let query = format!("SELECT {} FROM type::thing('network', $id)", NETWORK_FIELDS);
        let mut response = self
            .db
            .client()
            .query(&query)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let record: Option<NetworkRecord> = response.take(0).map_err(DbError::from)?;

        match record {
            Some(record) => Ok(Network::try_from(record)?),
            None => Err(DataError::network_not_found(id)),
        }
    }

    async fn all(&self) -> Result<Vec<Network>, DataError> {
        let query = format!(
            "SELECT {} FROM network ORDER BY created_ms ASC, network_id ASC",
            NETWORK_FIELDS
        );
        Ok(self.select(&query, None).await?)
    }

    async fn page(&self, page: usize, per_page: usize) -> Result<Vec<Network>, DataError> {
        let query = format!(
            "SELECT {} FROM network ORDER BY created_ms ASC, network_id ASC LIMIT $limit START $start",
            NETWORK_FIELDS
        );
        let start = page.saturating_sub(1).saturating_mul(per_page);
        Ok(self.select(&query, Some((start, per_page))).await?)
    }

    async fn count(&self) -> Result<u64, DataError> {
        #[derive(Deserialize)]
        struct CountRecord {
            count: i64,
        }

        let mut response = self
            .db
            .client()
            .query("SELECT count() AS count FROM network GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let counts: Vec<CountRecord> = response.take(0).map_err(DbError::from)?;
        Ok(counts.first().map(|c| c.count.max(0) as u64).unwrap_or(0))
    }

    async fn create(&self, params: NetworkParams) -> Result<Network, DataError> {
        let network = Network::build(params)?;
        self.insert(&network).await?;
        tracing::debug!(network_id = %network.id, "Created network");
        Ok(network)
    }

    async fn update(&self, id: Uuid, params: NetworkParams) -> Result<Network, DataError> {
        let current = self.find(id).await?;
        let updated = current.apply(params)?;
        match self.replace(&updated).await? {
            Some(network) => Ok(network),
            None => Err(DataError::network_not_found(id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), DataError> {
        self.find(id).await?;
        self.db
            .client()
            .query(
                r#"
                BEGIN TRANSACTION;
                DELETE membership WHERE network_id = $id;
                DELETE type::thing('network', $id);
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("id", id.to_string()))
            .await
            .and_then(|response| response.check())
            .map_err(DbError::from)?;
        tracing::debug!(network_id = %id, "Deleted network");
        Ok(())
    }
}
