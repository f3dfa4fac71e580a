use async_trait::async_trait;

use crate::{
    error::TopicsError,
    types::{Topic, TopicInput},
};

/// Remote collection endpoint for topics.
///
/// Implementations own transport concerns (timeouts, retries, auth); callers
/// only see the final outcome of each operation.
#[async_trait]
pub trait TopicsApi: Send + Sync {
    /// One page of topics in server order.
    async fn list(&self) -> Result<Vec<Topic>, TopicsError>;

    async fn get(&self, id: u64) -> Result<Topic, TopicsError>;

    /// Create a topic; the server assigns the id.
    async fn create(&self, input: &TopicInput) -> Result<Topic, TopicsError>;

    /// Replace a topic's fields; the returned record is authoritative.
    async fn update(&self, id: u64, input: &TopicInput) -> Result<Topic, TopicsError>;

    async fn remove(&self, id: u64) -> Result<(), TopicsError>;
}
