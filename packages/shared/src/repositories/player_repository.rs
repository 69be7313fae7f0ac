use crate::models::player_stats::PlayerStats;
use crate::repositories::errors::player_repository_errors::PlayerRepositoryError;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

#[cfg(test)]
use mockall::automock;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait PlayerRepository: Send + Sync {
    async fn create_player(&self, stats: &PlayerStats) -> Result<(), PlayerRepositoryError>;

    async fn get_player_stats(&self, player_id: &str)
        -> Result<PlayerStats, PlayerRepositoryError>;

    async fn set_player_stats(&self, stats: &PlayerStats) -> Result<(), PlayerRepositoryError>;

    /// Uniqueness pre-check run before creating a player record.
    async fn player_name_exists(&self, player_id: &str) -> Result<bool, PlayerRepositoryError>;
}

pub struct DynamoDbPlayerRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbPlayerRepository {
    pub fn new(client: Client) -> Self {
        let table_name = std::env::var("PLAYERS_TABLE")
            .expect("PLAYERS_TABLE environment variable must be set");
        Self { client, table_name }
    }
}

#[async_trait]
impl PlayerRepository for DynamoDbPlayerRepository {
    async fn create_player(&self, stats: &PlayerStats) -> Result<(), PlayerRepositoryError> {
        let item = serde_dynamo::to_item(stats)
            .map_err(|e| PlayerRepositoryError::Serialization(e.to_string()))?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(player_id)")
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("ConditionalCheckFailed") {
                    PlayerRepositoryError::AlreadyExists
                } else {
                    PlayerRepositoryError::DynamoDb(message)
                }
            })?;

        Ok(())
    }

    async fn get_player_stats(
        &self,
        player_id: &str,
    ) -> Result<PlayerStats, PlayerRepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("player_id", AttributeValue::S(player_id.to_string()))
            .send()
            .await
            .map_err(|e| PlayerRepositoryError::DynamoDb(e.to_string()))?;

        if let Some(item) = result.item {
            serde_dynamo::from_item(item)
                .map_err(|e| PlayerRepositoryError::Serialization(e.to_string()))
        } else {
            Err(PlayerRepositoryError::NotFound)
        }
    }

    async fn set_player_stats(&self, stats: &PlayerStats) -> Result<(), PlayerRepositoryError> {
        let item = serde_dynamo::to_item(stats)
            .map_err(|e| PlayerRepositoryError::Serialization(e.to_string()))?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_exists(player_id)")
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("ConditionalCheckFailed") {
                    PlayerRepositoryError::NotFound
                } else {
                    PlayerRepositoryError::DynamoDb(message)
                }
            })?;

        Ok(())
    }

    async fn player_name_exists(&self, player_id: &str) -> Result<bool, PlayerRepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("player_id", AttributeValue::S(player_id.to_string()))
            .send()
            .await
            .map_err(|e| PlayerRepositoryError::DynamoDb(e.to_string()))?;

        Ok(result.item.is_some())
    }
}
