//! Trusted channel records
//!
//! Commands are only accepted from channels an admin has trusted.

use crate::backend::SqlBackend;
use crate::clock::{from_millis, Clock};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct TrustedChannel {
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub channel_name: Option<String>,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

type ChannelRow = (String, String, String, String, i64);

pub struct ChannelRegistry {
    backend: Arc<SqlBackend>,
    clock: Arc<dyn Clock>,
}

impl ChannelRegistry {
    pub fn new(backend: Arc<SqlBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub async fn trust(
        &self,
        channel_id: &str,
        guild_id: Option<&str>,
        channel_name: Option<&str>,
        added_by: &str,
    ) -> Result<TrustedChannel> {
        if self.is_trusted(channel_id).await? {
            return Err(Error::ChannelAlreadyTrusted(display(channel_id, channel_name)));
        }

        let added_at = self.clock.now_millis();
        sqlx::query(
            "INSERT INTO trusted_channels (channel_id, guild_id, channel_name, added_by, added_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(channel_id)
        .bind(guild_id)
        .bind(channel_name)
        .bind(added_by)
        .bind(added_at)
        .execute(self.backend.pool())
        .await?;

        tracing::info!(channel_id, added_by, "Channel trusted");
        Ok(TrustedChannel {
            channel_id: channel_id.to_string(),
            guild_id: guild_id.map(String::from),
            channel_name: channel_name.map(String::from),
            added_by: added_by.to_string(),
            added_at: from_millis(added_at),
        })
    }

    pub async fn untrust(&self, channel_id: &str, channel_name: Option<&str>) -> Result<()> {
        let removed = sqlx::query("DELETE FROM trusted_channels WHERE channel_id = $1")
            .bind(channel_id)
            .execute(self.backend.pool())
            .await?
            .rows_affected();

        if removed == 0 {
            return Err(Error::ChannelNotTrusted(display(channel_id, channel_name)));
        }
        tracing::info!(channel_id, "Channel untrusted");
        Ok(())
    }

    pub async fn is_trusted(&self, channel_id: &str) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT channel_id FROM trusted_channels WHERE channel_id = $1")
                .bind(channel_id)
                .fetch_optional(self.backend.pool())
                .await?;
        Ok(row.is_some())
    }

    /// Trusted channels, optionally restricted to one guild.
    pub async fn list(&self, guild_id: Option<&str>) -> Result<Vec<TrustedChannel>> {
        let rows: Vec<ChannelRow> = match guild_id {
            Some(guild) => {
                sqlx::query_as(
                    "SELECT channel_id, COALESCE(guild_id, ''), COALESCE(channel_name, ''), added_by, added_at
                     FROM trusted_channels WHERE guild_id = $1 ORDER BY added_at",
                )
                .bind(guild)
                .fetch_all(self.backend.pool())
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT channel_id, COALESCE(guild_id, ''), COALESCE(channel_name, ''), added_by, added_at
                     FROM trusted_channels ORDER BY added_at",
                )
                .fetch_all(self.backend.pool())
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(channel_id, guild_id, channel_name, added_by, added_at)| TrustedChannel {
                channel_id,
                guild_id: non_empty(guild_id),
                channel_name: non_empty(channel_name),
                added_by,
                added_at: from_millis(added_at),
            })
            .collect())
    }
}

/// NULL columns come back as `''` through COALESCE.
fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn display(channel_id: &str, channel_name: Option<&str>) -> String {
    match channel_name {
        Some(name) => format!("#{name}"),
        None => channel_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[tokio::test]
    async fn test_trust_lifecycle() {
        let backend = Arc::new(SqlBackend::in_memory().await.unwrap());
        let registry = ChannelRegistry::new(backend, Arc::new(SystemClock));

        assert!(!registry.is_trusted("c1").await.unwrap());
        registry.trust("c1", Some("g1"), Some("terminal"), "admin").await.unwrap();
        registry.trust("c2", Some("g2"), None, "admin").await.unwrap();
        assert!(registry.is_trusted("c1").await.unwrap());

        assert!(matches!(
            registry.trust("c1", Some("g1"), Some("terminal"), "admin").await,
            Err(Error::ChannelAlreadyTrusted(name)) if name == "#terminal"
        ));

        assert_eq!(registry.list(None).await.unwrap().len(), 2);
        let in_g1 = registry.list(Some("g1")).await.unwrap();
        assert_eq!(in_g1.len(), 1);
        assert_eq!(in_g1[0].channel_name.as_deref(), Some("terminal"));

        registry.untrust("c1", None).await.unwrap();
        assert!(!registry.is_trusted("c1").await.unwrap());
        assert!(matches!(
            registry.untrust("c1", None).await,
            Err(Error::ChannelNotTrusted(_))
        ));
    }

    #[tokio::test]
    async fn test_list_reads_back_missing_names() {
        let backend = Arc::new(SqlBackend::in_memory().await.unwrap());
        let registry = ChannelRegistry::new(backend, Arc::new(SystemClock));

        registry.trust("c3", None, None, "admin").await.unwrap();
        let listed = registry.list(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].guild_id, None);
        assert_eq!(listed[0].channel_name, None);
        assert_eq!(listed[0].added_by, "admin");
    }
}
