use crate::models::game_session::{GameSession, SessionSummary, WILDCARD_PREFIX};
use crate::repositories::errors::game_repository_errors::GameSessionRepositoryError;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[cfg(test)]
use mockall::automock;

/// Stream of full session snapshots from the store's change subscription.
///
/// Delivery is at-least-once with no ordering guarantee relative to local
/// writes: a snapshot may be this side's own write echoed back, or arrive
/// before that write is acknowledged. Consumers classify by value, not by
/// arrival order. Dropping the watch tears down the producing task.
pub struct SessionWatch {
    receiver: mpsc::UnboundedReceiver<GameSession>,
    task: Option<JoinHandle<()>>,
}

impl SessionWatch {
    pub fn new(receiver: mpsc::UnboundedReceiver<GameSession>) -> Self {
        SessionWatch {
            receiver,
            task: None,
        }
    }

    pub fn with_task(receiver: mpsc::UnboundedReceiver<GameSession>, task: JoinHandle<()>) -> Self {
        SessionWatch {
            receiver,
            task: Some(task),
        }
    }

    pub async fn recv(&mut self) -> Option<GameSession> {
        self.receiver.recv().await
    }
}

impl Drop for SessionWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
#[cfg_attr(test, automock)]
pub trait GameSessionRepository: Send + Sync {
    async fn create_game_session(
        &self,
        game_session: &GameSession,
    ) -> Result<(), GameSessionRepositoryError>;

    async fn get_game_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GameSession>, GameSessionRepositoryError>;

    /// Open sessions another player could join: not finished, second seat
    /// empty, hosted by someone else. `None` filters are omitted from the
    /// store predicate entirely (wildcard searches).
    async fn find_open_sessions(
        &self,
        variant_name: Option<&str>,
        time_mode: Option<&str>,
        exclude_player: &str,
    ) -> Result<Vec<SessionSummary>, GameSessionRepositoryError>;

    /// Conditionally takes the second seat. Exactly one of two concurrent
    /// claims succeeds; the loser gets `Conflict`. Resolved wildcard fields
    /// are written in the same conditional update.
    async fn claim_second_seat(
        &self,
        session_id: &str,
        player_id: &str,
        rating: f64,
        resolved_variant: Option<&str>,
        resolved_time_mode: Option<&str>,
    ) -> Result<GameSession, GameSessionRepositoryError>;

    async fn write_position(
        &self,
        session_id: &str,
        position: &str,
    ) -> Result<(), GameSessionRepositoryError>;

    /// Flips `finished` to true. Returns false when another writer got
    /// there first, which callers treat as "already settled elsewhere".
    async fn finish_game_session(
        &self,
        session_id: &str,
    ) -> Result<bool, GameSessionRepositoryError>;

    /// Attaches the change subscription for one session document.
    fn watch_game_session(&self, session_id: &str) -> SessionWatch;
}

pub struct DynamoDbGameSessionRepository {
    pub client: Client,
    pub table_name: String,
    poll_interval: Duration,
}

impl DynamoDbGameSessionRepository {
    pub fn new(client: Client) -> Self {
        let table_name = std::env::var("GAME_SESSIONS_TABLE")
            .expect("GAME_SESSIONS_TABLE environment variable must be set");
        Self {
            client,
            table_name,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

async fn fetch_session(
    client: &Client,
    table_name: &str,
    session_id: &str,
) -> Result<Option<GameSession>, GameSessionRepositoryError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("session_id", AttributeValue::S(session_id.to_string()))
        .send()
        .await
        .map_err(|e| GameSessionRepositoryError::DynamoDb(e.to_string()))?;

    if let Some(item) = result.item {
        let game_session: GameSession = serde_dynamo::from_item(item)
            .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))?;
        Ok(Some(game_session))
    } else {
        Ok(None)
    }
}

fn is_conditional_check_failure(message: &str) -> bool {
    message.contains("ConditionalCheckFailed")
}

#[async_trait]
impl GameSessionRepository for DynamoDbGameSessionRepository {
    async fn create_game_session(
        &self,
        game_session: &GameSession,
    ) -> Result<(), GameSessionRepositoryError> {
        let item = serde_dynamo::to_item(game_session)
            .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(session_id)")
            .send()
            .await
            .map_err(|e| GameSessionRepositoryError::DynamoDb(e.to_string()))?;

        Ok(())
    }

    async fn get_game_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GameSession>, GameSessionRepositoryError> {
        fetch_session(&self.client, &self.table_name, session_id).await
    }

    async fn find_open_sessions(
        &self,
        variant_name: Option<&str>,
        time_mode: Option<&str>,
        exclude_player: &str,
    ) -> Result<Vec<SessionSummary>, GameSessionRepositoryError> {
        let mut filter =
            String::from("finished = :finished AND player2_id = :empty AND player1_id <> :exclude");
        let mut scan = self
            .client
            .scan()
            .table_name(&self.table_name)
            .expression_attribute_values(":finished", AttributeValue::Bool(false))
            .expression_attribute_values(":empty", AttributeValue::S(String::new()))
            .expression_attribute_values(":exclude", AttributeValue::S(exclude_player.to_string()));

        // sessions hosted with a wildcard field stay discoverable by
        // concrete searches; the field is resolved at join time
        if let Some(variant) = variant_name {
            filter.push_str(" AND (variant_name = :variant OR begins_with(variant_name, :wildcard))");
            scan = scan
                .expression_attribute_values(":variant", AttributeValue::S(variant.to_string()));
        }
        if let Some(time_mode) = time_mode {
            filter.push_str(" AND (time_mode = :time_mode OR begins_with(time_mode, :wildcard))");
            scan = scan
                .expression_attribute_values(":time_mode", AttributeValue::S(time_mode.to_string()));
        }
        if variant_name.is_some() || time_mode.is_some() {
            scan = scan.expression_attribute_values(
                ":wildcard",
                AttributeValue::S(WILDCARD_PREFIX.to_string()),
            );
        }

        let result = scan
            .filter_expression(filter)
            .send()
            .await
            .map_err(|e| GameSessionRepositoryError::DynamoDb(e.to_string()))?;

        let mut summaries = Vec::new();
        for item in result.items.unwrap_or_default() {
            let game_session: GameSession = serde_dynamo::from_item(item)
                .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))?;
            summaries.push(game_session.summary());
        }

        Ok(summaries)
    }

    async fn claim_second_seat(
        &self,
        session_id: &str,
        player_id: &str,
        rating: f64,
        resolved_variant: Option<&str>,
        resolved_time_mode: Option<&str>,
    ) -> Result<GameSession, GameSessionRepositoryError> {
        let mut update = String::from("SET player2_id = :player_id, player2_rating = :rating");
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("session_id", AttributeValue::S(session_id.to_string()))
            .condition_expression(
                "attribute_exists(session_id) AND player2_id = :empty AND finished = :finished",
            )
            .expression_attribute_values(":player_id", AttributeValue::S(player_id.to_string()))
            .expression_attribute_values(":rating", AttributeValue::N(rating.to_string()))
            .expression_attribute_values(":empty", AttributeValue::S(String::new()))
            .expression_attribute_values(":finished", AttributeValue::Bool(false));

        if let Some(variant) = resolved_variant {
            update.push_str(", variant_name = :variant");
            request = request
                .expression_attribute_values(":variant", AttributeValue::S(variant.to_string()));
        }
        if let Some(time_mode) = resolved_time_mode {
            update.push_str(", time_mode = :time_mode");
            request = request.expression_attribute_values(
                ":time_mode",
                AttributeValue::S(time_mode.to_string()),
            );
        }

        let result = request
            .update_expression(update)
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if is_conditional_check_failure(&message) {
                    GameSessionRepositoryError::Conflict("second seat already taken".to_string())
                } else {
                    GameSessionRepositoryError::DynamoDb(message)
                }
            })?;

        let attributes = result
            .attributes
            .ok_or_else(|| GameSessionRepositoryError::DynamoDb("no attributes returned".to_string()))?;
        serde_dynamo::from_item(attributes)
            .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))
    }

    async fn write_position(
        &self,
        session_id: &str,
        position: &str,
    ) -> Result<(), GameSessionRepositoryError> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("session_id", AttributeValue::S(session_id.to_string()))
            .condition_expression("attribute_exists(session_id)")
            .update_expression("SET current_position = :position")
            .expression_attribute_values(":position", AttributeValue::S(position.to_string()))
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if is_conditional_check_failure(&message) {
                    GameSessionRepositoryError::NotFound
                } else {
                    GameSessionRepositoryError::DynamoDb(message)
                }
            })?;

        Ok(())
    }

    async fn finish_game_session(
        &self,
        session_id: &str,
    ) -> Result<bool, GameSessionRepositoryError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("session_id", AttributeValue::S(session_id.to_string()))
            .condition_expression("attribute_exists(session_id) AND finished = :not_finished")
            .update_expression("SET finished = :finished")
            .expression_attribute_values(":finished", AttributeValue::Bool(true))
            .expression_attribute_values(":not_finished", AttributeValue::Bool(false))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = e.to_string();
                if is_conditional_check_failure(&message) {
                    Ok(false)
                } else {
                    Err(GameSessionRepositoryError::DynamoDb(message))
                }
            }
        }
    }

    fn watch_game_session(&self, session_id: &str) -> SessionWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let table_name = self.table_name.clone();
        let session_id = session_id.to_string();
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut last_seen: Option<GameSession> = None;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match fetch_session(&client, &table_name, &session_id).await {
                    Ok(Some(game_session)) => {
                        if last_seen.as_ref() != Some(&game_session) {
                            last_seen = Some(game_session.clone());
                            if tx.send(game_session).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("session watch read failed for {}: {}", session_id, e);
                    }
                }
            }
        });

        SessionWatch::with_task(rx, task)
    }
}
