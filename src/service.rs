//! Service façade.
//!
//! Explicitly constructed, dependency-injected handle bundling the shared
//! embedder, vector index, prompt resolver, and completion client. Cheap to
//! clone; one handle serves all request tasks.

use std::sync::Arc;

use crate::completion::{CompletionService, HttpCompletionClient};
use crate::core::config::RagConfig;
use crate::core::errors::RagError;
use crate::embedding::HttpEmbedder;
use crate::index::VectorIndex;
use crate::prompts::{PromptProvider, PromptResolver, SqlitePromptStore};
use crate::retrieval::{Query, RetrievalPipeline};
use crate::synthesis::{is_small_talk, Answer, AnswerSynthesizer};

#[derive(Clone)]
pub struct RagService {
    index: Arc<VectorIndex>,
    pipeline: Arc<RetrievalPipeline>,
    synthesizer: Arc<AnswerSynthesizer>,
}

impl RagService {
    /// Build the full production service from configuration.
    ///
    /// An unreachable embedding service is fatal; an unreachable remote
    /// index degrades to the in-memory backend inside `VectorIndex::connect`.
    pub async fn initialize(config: &RagConfig) -> Result<Self, RagError> {
        let embedder = Arc::new(
            HttpEmbedder::connect(&config.embedding, config.index.vector_size).await?,
        );
        let index = Arc::new(VectorIndex::connect(&config.index, embedder).await);

        let provider: Option<Arc<dyn PromptProvider>> = match &config.prompt_db {
            Some(path) => Some(Arc::new(SqlitePromptStore::with_path(path.clone()).await?)),
            None => None,
        };
        let resolver = PromptResolver::new(provider, config.prompts.clone());
        let completion: Arc<dyn CompletionService> =
            Arc::new(HttpCompletionClient::new(&config.completion)?);

        Ok(Self::new(index, resolver, completion))
    }

    /// Assemble from already-constructed parts (tests, custom backends).
    pub fn new(
        index: Arc<VectorIndex>,
        resolver: PromptResolver,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            pipeline: Arc::new(RetrievalPipeline::new(index.clone())),
            synthesizer: Arc::new(AnswerSynthesizer::new(resolver, completion)),
            index,
        }
    }

    /// The shared index handle, for ingestion and deletion paths.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Answer one query end to end.
    ///
    /// Small talk short-circuits before any retrieval; empty retrieval
    /// resolves to the fixed no-grounding reply.
    pub async fn answer(&self, query: &Query) -> Answer {
        if is_small_talk(&query.text) {
            return AnswerSynthesizer::small_talk_answer();
        }

        let fragments = self.pipeline.retrieve(query).await;
        if fragments.is_empty() {
            tracing::debug!("No admissible fragments for query, returning no-grounding reply");
            return AnswerSynthesizer::no_grounding_answer();
        }

        self.synthesizer.synthesize(query, &fragments).await
    }
}
