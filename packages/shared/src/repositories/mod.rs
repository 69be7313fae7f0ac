pub mod errors;
pub mod game_repository;
pub mod memory;
pub mod player_repository;

/// DynamoDB client wired from the ambient AWS environment, shared by all
/// repository constructors.
pub async fn dynamodb_client_from_env() -> aws_sdk_dynamodb::Client {
    let config = aws_config::load_from_env().await;
    aws_sdk_dynamodb::Client::new(&config)
}
