use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Single-turn completion. An empty `system_prompt` sends no system
    /// message.
    async fn generate_text(&self, prompt: &str, system_prompt: &str) -> Result<String>;
}
