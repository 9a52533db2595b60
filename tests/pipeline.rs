//! End-to-end scenarios over the in-memory backend with mock
//! embedder/completion implementations.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sitechat_core::core::config::PromptDefaults;
use sitechat_core::{
    ChatTurn, CompletionRequest, CompletionService, Embedder, FragmentPayload, PromptResolver,
    Query, RagError, RagService, RetrievalPipeline, VectorIndex, NO_GROUNDING_REPLY,
};

/// Deterministic keyword-axis embedder: one axis per topic keyword plus a
/// constant bias so no text embeds to the zero vector.
struct KeywordEmbedder;

const AXES: &[&str] = &["sky", "ocean", "math"];

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn dim(&self) -> usize {
        AXES.len() + 1
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = AXES
            .iter()
            .map(|axis| if lower.contains(axis) { 1.0 } else { 0.0 })
            .collect();
        vector.push(0.1);
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        Ok(vector.into_iter().map(|x| x / norm).collect())
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.encode(text).await?);
        }
        Ok(out)
    }
}

/// Canned completion that counts invocations.
struct CannedCompletion {
    reply: String,
    calls: AtomicUsize,
}

impl CannedCompletion {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for CannedCompletion {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

struct FailingCompletion;

#[async_trait]
impl CompletionService for FailingCompletion {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, RagError> {
        Err(RagError::Completion("503 overloaded".to_string()))
    }
}

fn payload(text: &str, file_id: &str, file_name: &str, collection: &str) -> FragmentPayload {
    FragmentPayload {
        text: text.to_string(),
        file_id: file_id.to_string(),
        file_name: file_name.to_string(),
        chunk_index: 0,
        collection_id: Some(collection.to_string()),
        website_id: None,
    }
}

fn service_with(completion: Arc<dyn CompletionService>) -> RagService {
    let index = Arc::new(VectorIndex::in_memory(Arc::new(KeywordEmbedder)));
    let resolver = PromptResolver::new(None, PromptDefaults::default());
    RagService::new(index, resolver, completion)
}

#[tokio::test]
async fn fragments_never_cross_collection_scope() {
    let completion = CannedCompletion::new("answer");
    let service = service_with(completion.clone());

    service
        .index()
        .upsert("the sky is blue", payload("the sky is blue", "f1", "a.pdf", "c1"))
        .await
        .unwrap();

    let query = Query::new("why is the sky blue?").with_collection("c2");
    let answer = service.answer(&query).await;

    assert_eq!(answer.text, NO_GROUNDING_REPLY);
    assert!(!answer.grounded);
    // Nothing admissible, so the completion service is never invoked.
    assert_eq!(completion.calls(), 0);

    // Same query in the owning collection is grounded.
    let query = Query::new("why is the sky blue?").with_collection("c1");
    let answer = service.answer(&query).await;
    assert!(answer.grounded);
    assert_eq!(answer.sources, vec!["a.pdf"]);
}

#[tokio::test]
async fn entitlement_set_restricts_files() {
    let completion = CannedCompletion::new("answer");
    let service = service_with(completion.clone());

    for (file_id, file_name) in [("f1", "a.pdf"), ("f2", "b.pdf")] {
        service
            .index()
            .upsert(
                "the sky is blue",
                payload("the sky is blue", file_id, file_name, "c1"),
            )
            .await
            .unwrap();
    }

    let allowed: HashSet<String> = ["f2".to_string()].into();
    let query = Query::new("sky color?")
        .with_collection("c1")
        .with_allowed_files(allowed);
    let answer = service.answer(&query).await;

    assert!(answer.grounded);
    assert_eq!(answer.sources, vec!["b.pdf"]);

    // An empty entitlement set means no grounding, not an error.
    let query = Query::new("sky color?")
        .with_collection("c1")
        .with_allowed_files(HashSet::new());
    let answer = service.answer(&query).await;
    assert_eq!(answer.text, NO_GROUNDING_REPLY);
}

#[tokio::test]
async fn empty_index_yields_no_grounding_reply() {
    let completion = CannedCompletion::new("answer");
    let service = service_with(completion.clone());

    let answer = service.answer(&Query::new("anything at all")).await;
    assert_eq!(answer.text, NO_GROUNDING_REPLY);
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn greeting_short_circuits_before_retrieval() {
    let completion = CannedCompletion::new("answer");
    let service = service_with(completion.clone());

    service
        .index()
        .upsert("the sky is blue", payload("the sky is blue", "f1", "a.pdf", "c1"))
        .await
        .unwrap();

    let answer = service.answer(&Query::new("  Hello ")).await;
    assert!(!answer.grounded);
    assert!(answer.text.contains("help you find answers"));
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn sources_section_is_canonicalized() {
    // The model duplicates and mis-orders its citations; the canonical
    // section must still list each retrieved file once, alphabetically.
    let completion =
        CannedCompletion::new("Blue comes from scattering.\n\nSources:\n- b.pdf\n- b.pdf\n- weird.txt");
    let service = service_with(completion.clone());

    service
        .index()
        .upsert("the sky is blue", payload("the sky is blue", "f1", "b.pdf", "c1"))
        .await
        .unwrap();
    service
        .index()
        .upsert("the sky looks blue at noon", payload("the sky looks blue at noon", "f2", "a.pdf", "c1"))
        .await
        .unwrap();

    let query = Query::new("why is the sky blue?").with_collection("c1");
    let answer = service.answer(&query).await;

    assert!(answer.grounded);
    assert_eq!(answer.sources, vec!["a.pdf", "b.pdf"]);
    assert!(answer.text.ends_with("Sources:\n- a.pdf\n- b.pdf"));
    assert!(!answer.text.contains("weird.txt"));
    assert!(answer.text.starts_with("Blue comes from scattering."));
}

#[tokio::test]
async fn completion_failure_degrades_to_fixed_reply() {
    let service = service_with(Arc::new(FailingCompletion));

    service
        .index()
        .upsert("the sky is blue", payload("the sky is blue", "f1", "a.pdf", "c1"))
        .await
        .unwrap();

    let query = Query::new("why is the sky blue?").with_collection("c1");
    let answer = service.answer(&query).await;

    assert_eq!(answer.text, NO_GROUNDING_REPLY);
    assert!(!answer.grounded);
    // Raw provider error text never leaks into the reply.
    assert!(!answer.text.contains("overloaded"));
}

#[tokio::test]
async fn upsert_then_delete_restores_population() {
    let index = Arc::new(VectorIndex::in_memory(Arc::new(KeywordEmbedder)));
    let before = index.count().await.unwrap();

    let id = index
        .upsert("the ocean is deep", payload("the ocean is deep", "f1", "a.pdf", "c1"))
        .await
        .unwrap();
    assert_eq!(index.count().await.unwrap(), before + 1);

    index.delete(&id).await.unwrap();
    assert_eq!(index.count().await.unwrap(), before);

    let hits = index
        .search("ocean", 10, &sitechat_core::ScopeFilter::collection("c1"))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn identical_queries_return_identical_rankings() {
    let index = Arc::new(VectorIndex::in_memory(Arc::new(KeywordEmbedder)));
    let texts = [
        ("the sky is blue", "f1", "a.pdf"),
        ("the ocean and the sky", "f2", "b.pdf"),
        ("math is about numbers", "f3", "c.pdf"),
    ];
    for (text, file_id, file_name) in texts {
        index
            .upsert(text, payload(text, file_id, file_name, "c1"))
            .await
            .unwrap();
    }

    let pipeline = RetrievalPipeline::new(index);
    let query = Query::new("tell me about the sky").with_collection("c1");

    let first = pipeline.retrieve(&query).await;
    let second = pipeline.retrieve(&query).await;

    let ids = |fragments: &[sitechat_core::RetrievedFragment]| {
        fragments.iter().map(|f| f.file_id.clone()).collect::<Vec<_>>()
    };
    assert!(!first.is_empty());
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(first[0].file_id, "f1");
}

#[tokio::test]
async fn history_is_carried_into_synthesis() {
    let completion = CannedCompletion::new("contextual answer");
    let service = service_with(completion.clone());

    service
        .index()
        .upsert("the sky is blue", payload("the sky is blue", "f1", "a.pdf", "c1"))
        .await
        .unwrap();

    let query = Query::new("and why is the sky that color?")
        .with_collection("c1")
        .with_history(vec![
            ChatTurn::user("what color is the sky?"),
            ChatTurn::assistant("Blue."),
        ]);
    let answer = service.answer(&query).await;

    assert!(answer.grounded);
    assert_eq!(completion.calls(), 1);
}
