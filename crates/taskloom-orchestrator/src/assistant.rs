use crate::coordinator::render_context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskloom_core::{TaskloomError, TaskloomResult};
use taskloom_llm::{ChatRequest, ProviderGateway};
use taskloom_retrieval::{RetrievalFusion, SearchResult, SearchSource, WebEngine};
use tracing::info;

const ASSISTANT_PROMPT: &str = "You are a helpful assistant. When numbered search results are \
provided, ground your answer in them and cite them as [n]. If they do not answer the question, \
say so.";

/// Reply of the retrieval-augmented assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    /// Answer text.
    pub content: String,
    /// Results the answer was grounded on, when a search was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<SearchResult>>,
    /// URLs of `search_results`, in the same order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// Conversational front end: optional retrieval, then one provider call.
pub struct Assistant {
    gateway: Arc<ProviderGateway>,
    fusion: Option<Arc<RetrievalFusion>>,
}

impl Assistant {
    /// Assistant without retrieval.
    pub fn new(gateway: Arc<ProviderGateway>) -> Self {
        Self {
            gateway,
            fusion: None,
        }
    }

    /// Allow searches through `fusion`.
    pub fn with_fusion(mut self, fusion: Arc<RetrievalFusion>) -> Self {
        self.fusion = Some(fusion);
        self
    }

    /// `chat(message, providerId?) -> {content, searchResults?, sources?}`.
    ///
    /// With a search selector the fused results are numbered into the prompt
    /// and returned next to the answer. A search failure fails the call.
    pub async fn chat(
        &self,
        message: &str,
        provider_id: Option<&str>,
        search: Option<(SearchSource, WebEngine)>,
    ) -> TaskloomResult<ChatReply> {
        let results = match search {
            Some((source, engine)) => {
                let fusion = self.fusion.as_ref().ok_or_else(|| {
                    TaskloomError::Config("search requested but retrieval is not configured".into())
                })?;
                Some(fusion.search(message, source, engine).await?)
            }
            None => None,
        };

        let prompt = match results.as_deref() {
            Some(hits) if !hits.is_empty() => {
                format!("{}\nQuestion: {message}", render_context(hits))
            }
            _ => message.to_string(),
        };

        let mut request = ChatRequest::new(prompt).with_system_prompt(ASSISTANT_PROMPT);
        request.provider_id = provider_id.map(str::to_string);
        let response = self.gateway.complete(request).await?;

        info!(
            provider = %response.provider,
            results = results.as_ref().map_or(0, Vec::len),
            "Assistant replied"
        );

        let sources = results
            .as_ref()
            .map(|hits| hits.iter().map(|r| r.url.clone()).collect());
        Ok(ChatReply {
            content: response.content,
            search_results: results,
            sources,
        })
    }
}
