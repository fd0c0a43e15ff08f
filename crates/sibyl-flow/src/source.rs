//! The two collaborators a flow drives.

use async_trait::async_trait;
use sibyl_core::{Context, LogEntry};
use sibyl_model_host::{HostError, ModelHost};
use sibyl_wiki::{Page, PageId, SearchKind, WikiClient, WikiError};

/// A language model that can measure and continue prompts.
#[async_trait]
pub trait Model: Send + Sync {
    async fn count_tokens(&self, ctx: &Context, prompt: &str) -> Result<usize, HostError>;

    /// Generate a continuation, recording the exchange in `log`.
    async fn generate(
        &self,
        ctx: &Context,
        prompt: &str,
        log: &mut LogEntry,
    ) -> Result<String, HostError>;
}

/// Searchable collection of background documents.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn search(
        &self,
        ctx: &Context,
        query: &str,
        kind: SearchKind,
        max_results: usize,
    ) -> Result<Vec<PageId>, WikiError>;

    async fn get(&self, ctx: &Context, page_id: i64) -> Result<Page, WikiError>;
}

#[async_trait]
impl Model for ModelHost {
    async fn count_tokens(&self, ctx: &Context, prompt: &str) -> Result<usize, HostError> {
        ModelHost::count_tokens(self, ctx, prompt).await
    }

    async fn generate(
        &self,
        ctx: &Context,
        prompt: &str,
        log: &mut LogEntry,
    ) -> Result<String, HostError> {
        ModelHost::generate(self, ctx, prompt, log).await
    }
}

#[async_trait]
impl KnowledgeSource for WikiClient {
    async fn search(
        &self,
        ctx: &Context,
        query: &str,
        kind: SearchKind,
        max_results: usize,
    ) -> Result<Vec<PageId>, WikiError> {
        WikiClient::search(self, ctx, query, kind, max_results).await
    }

    async fn get(&self, ctx: &Context, page_id: i64) -> Result<Page, WikiError> {
        WikiClient::get(self, ctx, page_id).await
    }
}
