//! Retrieval orchestrator
//!
//! Runs one question through embed → retrieve → prompt → complete → extract.

use super::completion::CompletionService;
use super::prompt::build_prompt;
use super::reasoning::strip_reasoning;
use crate::config::AppConfig;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::index::{RetrievedDocument, VectorIndex};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Answer returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Question as submitted
    pub question: String,
    /// Completion with the reasoning segment removed
    pub answer: String,
    /// Retrieved document texts, nearest first
    pub chunks: Vec<String>,
}

/// Full result of a question, including what the facade usually hides
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub response: QueryResponse,
    /// Retrieved documents with distances and metadata, nearest first
    pub matches: Vec<RetrievedDocument>,
    /// Prompt sent to the completion service
    pub prompt: String,
}

/// Per-request defaults
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub collection: String,
    pub top_k: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            collection: config.vector_index.collection.clone(),
            top_k: config.retrieval.top_k,
            max_tokens: config.completion.max_tokens,
            temperature: config.completion.temperature,
        }
    }
}

/// Retrieval-and-answer core.
///
/// Holds only shared read-only clients, so one instance serves any number of
/// concurrent questions.
pub struct RetrievalOrchestrator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    completion: Arc<dyn CompletionService>,
    settings: OrchestratorSettings,
}

impl RetrievalOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        completion: Arc<dyn CompletionService>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            completion,
            settings,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.settings.top_k
    }

    pub fn collection(&self) -> &str {
        &self.settings.collection
    }

    /// Answer a question from the indexed corpus
    pub async fn answer_question(&self, question: &str, top_k: Option<usize>) -> Result<QueryResponse> {
        self.answer_question_detailed(question, top_k)
            .await
            .map(|outcome| outcome.response)
    }

    /// Answer a question and keep distances, metadata and the prompt
    #[instrument(skip(self), fields(collection = %self.settings.collection))]
    pub async fn answer_question_detailed(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<QueryOutcome> {
        let start = Instant::now();
        let result = self.run(question, top_k).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(outcome) => {
                metrics::record_question(elapsed, "success", outcome.matches.len());
                info!(
                    chunks = outcome.matches.len(),
                    duration_ms = (elapsed * 1000.0) as u64,
                    "Question answered"
                );
            }
            Err(e) => metrics::record_question(elapsed, e.class().as_str(), 0),
        }
        result
    }

    fn validate<'q>(&self, question: &'q str, top_k: Option<usize>) -> Result<(&'q str, usize)> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("question", "question must not be empty"));
        }
        let k = top_k.unwrap_or(self.settings.top_k);
        if k == 0 {
            return Err(AppError::validation("top_k", "top_k must be greater than 0"));
        }
        Ok((trimmed, k))
    }

    async fn run(&self, question: &str, top_k: Option<usize>) -> Result<QueryOutcome> {
        let (trimmed, k) = self.validate(question, top_k).map_err(|e| {
            warn!(question, stage = "validate", error = %e, "Question rejected");
            e
        })?;

        let embedding = timed_stage("embed", trimmed, self.embedder.embed(trimmed)).await?;

        let result = timed_stage(
            "retrieve",
            trimmed,
            self.index.query(&self.settings.collection, &embedding, k),
        )
        .await?;
        let matches = result.into_ranked();
        debug!(question = trimmed, requested = k, found = matches.len(), "Documents retrieved");

        let chunks: Vec<String> = matches.iter().map(|m| m.document.text.clone()).collect();
        let prompt = build_prompt(trimmed, &chunks);

        let raw = timed_stage(
            "complete",
            trimmed,
            self.completion
                .complete(&prompt, self.settings.max_tokens, self.settings.temperature),
        )
        .await?;

        Ok(QueryOutcome {
            response: QueryResponse {
                question: question.to_string(),
                answer: strip_reasoning(&raw),
                chunks,
            },
            matches,
            prompt,
        })
    }
}

async fn timed_stage<T, F>(stage: &'static str, question: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = future.await;
    metrics::record_stage(stage, start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        error!(
            question,
            stage,
            error = %e,
            error_code = ?e.code(),
            "Question failed"
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MockCompletionService;
    use crate::embeddings::MockEmbedder;
    use crate::index::{DistanceMetric, Document, InMemoryIndex, IndexRecord};
    use async_trait::async_trait;

    const COLLECTION: &str = "test_collection";

    /// Embeds every text to the same vector
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }
    }

    struct FailingCompletion;

    #[async_trait]
    impl CompletionService for FailingCompletion {
        async fn complete(&self, _prompt: &str, _max_tokens: u32, _temperature: f32) -> Result<String> {
            Err(AppError::Upstream {
                service: "completion".to_string(),
                message: "HTTP 500 Internal Server Error".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            collection: COLLECTION.to_string(),
            top_k: 10,
            max_tokens: 2048,
            temperature: 0.0,
        }
    }

    fn document(id: &str, text: &str) -> Document {
        Document {
            id: id.to_string(),
            text: text.to_string(),
            source_page_id: format!("page-{}", id),
        }
    }

    /// Paris at squared distance 0.1 from the origin, Berlin at 0.4
    async fn capitals_index() -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new());
        index
            .create_collection(COLLECTION, 2, DistanceMetric::L2)
            .await
            .unwrap();
        index
            .add(
                COLLECTION,
                &[
                    IndexRecord::new(
                        document("berlin", "Berlin is the capital of Germany."),
                        vec![0.6, 0.2],
                    ),
                    IndexRecord::new(
                        document("paris", "Paris is the capital of France."),
                        vec![0.3, 0.1],
                    ),
                ],
            )
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_answers_from_ranked_documents() {
        let completion = Arc::new(MockCompletionService::new("<think>easy</think> Paris"));
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(FixedEmbedder(vec![0.0, 0.0])),
            capitals_index().await,
            completion.clone(),
            settings(),
        );

        let outcome = orchestrator
            .answer_question_detailed("What is the capital of France?", None)
            .await
            .unwrap();

        assert_eq!(outcome.response.answer, "Paris");
        assert_eq!(
            outcome.response.chunks,
            vec![
                "Paris is the capital of France.",
                "Berlin is the capital of Germany."
            ]
        );
        assert!((outcome.matches[0].distance - 0.1).abs() < 1e-5);
        assert!((outcome.matches[1].distance - 0.4).abs() < 1e-5);
        assert_eq!(outcome.matches[0].document.source_page_id, "page-paris");

        let prompts = completion.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0], outcome.prompt);
        let paris = prompts[0].find("Paris is the capital").unwrap();
        let berlin = prompts[0].find("Berlin is the capital").unwrap();
        assert!(paris < berlin);
        assert!(prompts[0].contains("«What is the capital of France?»"));
    }

    #[tokio::test]
    async fn test_top_k_larger_than_collection() {
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(FixedEmbedder(vec![0.0, 0.0])),
            capitals_index().await,
            Arc::new(MockCompletionService::new("ok")),
            settings(),
        );

        let response = orchestrator
            .answer_question("capital?", Some(10))
            .await
            .unwrap();
        assert_eq!(response.chunks.len(), 2);

        let response = orchestrator.answer_question("capital?", Some(1)).await.unwrap();
        assert_eq!(response.chunks, vec!["Paris is the capital of France."]);
    }

    #[tokio::test]
    async fn test_question_is_echoed_untrimmed() {
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(FixedEmbedder(vec![0.0, 0.0])),
            capitals_index().await,
            Arc::new(MockCompletionService::new("answer")),
            settings(),
        );

        let outcome = orchestrator
            .answer_question_detailed("  capital?  ", None)
            .await
            .unwrap();
        assert_eq!(outcome.response.question, "  capital?  ");
        assert!(outcome.prompt.ends_with("«capital?»"));
    }

    #[tokio::test]
    async fn test_empty_question_rejected_before_remote_calls() {
        let completion = Arc::new(MockCompletionService::new("unused"));
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(MockEmbedder::new(2)),
            capitals_index().await,
            completion.clone(),
            settings(),
        );

        let err = orchestrator.answer_question("   ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = orchestrator.answer_question("q", Some(0)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        assert!(completion.prompts().is_empty());
    }

    /// Collects formatted log lines in memory
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_rejected_question_is_logged_with_stage() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(MockEmbedder::new(2)),
            capitals_index().await,
            Arc::new(MockCompletionService::new("unused")),
            settings(),
        );
        orchestrator
            .answer_question("Столица Франции?", Some(0))
            .await
            .unwrap_err();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Question rejected"));
        assert!(output.contains("Столица Франции?"));
        assert!(output.contains("stage=\"validate\""));
    }

    #[tokio::test]
    async fn test_missing_collection_is_not_created() {
        let index = Arc::new(InMemoryIndex::new());
        let completion = Arc::new(MockCompletionService::new("unused"));
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(MockEmbedder::new(2)),
            index.clone(),
            completion.clone(),
            settings(),
        );

        let err = orchestrator.answer_question("q", None).await.unwrap_err();
        assert!(matches!(err, AppError::CollectionNotFound { .. }));
        assert!(!index.collection_exists(COLLECTION).await.unwrap());
        assert!(completion.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_retrieval_error() {
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(MockEmbedder::new(384)),
            capitals_index().await,
            Arc::new(MockCompletionService::new("unused")),
            settings(),
        );

        let err = orchestrator.answer_question("q", None).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::DimensionMismatch {
                expected: 2,
                actual: 384
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_collection_still_completes() {
        let index = Arc::new(InMemoryIndex::new());
        index
            .create_collection(COLLECTION, 2, DistanceMetric::L2)
            .await
            .unwrap();
        let completion = Arc::new(MockCompletionService::new("no idea"));
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(MockEmbedder::new(2)),
            index,
            completion.clone(),
            settings(),
        );

        let response = orchestrator.answer_question("anything", None).await.unwrap();
        assert!(response.chunks.is_empty());
        assert_eq!(response.answer, "no idea");
        assert!(!completion.prompts()[0].contains("1)"));
    }

    #[tokio::test]
    async fn test_completion_failure_propagates() {
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(FixedEmbedder(vec![0.0, 0.0])),
            capitals_index().await,
            Arc::new(FailingCompletion),
            settings(),
        );

        let err = orchestrator.answer_question("q", None).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { .. }));
        assert_eq!(err.status_code().as_u16(), 502);
    }

    #[test]
    fn test_settings_from_config() {
        let config = AppConfig::default();
        let settings = OrchestratorSettings::from(&config);
        assert_eq!(settings.collection, "ru_bq_collection");
        assert_eq!(settings.top_k, 10);
        assert_eq!(settings.max_tokens, 2048);
        assert_eq!(settings.temperature, 0.0);
    }
}
