//! Question console
//!
//! Asks the retrieval core one question, or reads questions from a stream
//! until `exit`, and prints the retrieved chunks, the prompt and the answer.

use crate::errors::Result;
use ragforge_common::{context::QueryOutcome, index::METADATA_UID, RetrievalOrchestrator};
use std::fmt::Write as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

const EXIT_COMMAND: &str = "exit";

/// Human-readable report of one answered question
pub fn render_outcome(question: &str, outcome: &QueryOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Запрос: {}", question);

    let _ = writeln!(out, "\n=== Найденные чанки ===");
    for (i, found) in outcome.matches.iter().enumerate() {
        let uid = found
            .metadata
            .get(METADATA_UID)
            .map(String::as_str)
            .unwrap_or(found.document.id.as_str());
        let _ = writeln!(out, "{}. UID: {}, расстояние: {:.4}", i + 1, uid, found.distance);
        let _ = writeln!(out, "Текст: {}\n", found.document.text);
    }

    let _ = writeln!(out, "\n=== Сформированный prompt ===\n");
    let _ = writeln!(out, "{}", outcome.prompt);

    let _ = writeln!(out, "\n=== Ответ модели ===\n");
    let _ = writeln!(out, "{}", outcome.response.answer);
    out
}

/// Answer a single question and write the report
pub async fn ask_once<W>(
    orchestrator: &RetrievalOrchestrator,
    question: &str,
    top_k: Option<usize>,
    output: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let outcome = orchestrator.answer_question_detailed(question, top_k).await?;
    output
        .write_all(render_outcome(question.trim(), &outcome).as_bytes())
        .await?;
    output.flush().await?;
    Ok(())
}

/// Read questions line by line until `exit` or end of input. A failed
/// question is reported and the session continues.
pub async fn run_session<R, W>(
    orchestrator: &RetrievalOrchestrator,
    top_k: Option<usize>,
    input: R,
    output: &mut W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all("Введите вопрос для обработки (для выхода введите 'exit'):\n".as_bytes())
        .await?;

    let mut answered = 0;
    let mut lines = input.lines();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();

        if question.eq_ignore_ascii_case(EXIT_COMMAND) {
            output.write_all("Выход из программы.\n".as_bytes()).await?;
            break;
        }
        if question.is_empty() {
            output
                .write_all("Пожалуйста, введите непустой вопрос.\n".as_bytes())
                .await?;
            continue;
        }

        match ask_once(orchestrator, question, top_k, output).await {
            Ok(()) => answered += 1,
            Err(e) => {
                warn!(question, error = %e, "Question failed");
                output
                    .write_all(format!("Ошибка: {}\n", e).as_bytes())
                    .await?;
            }
        }
    }

    output.flush().await?;
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragforge_common::context::{MockCompletionService, OrchestratorSettings};
    use ragforge_common::embeddings::{Embedder, MockEmbedder};
    use ragforge_common::index::{DistanceMetric, Document, InMemoryIndex, IndexRecord, VectorIndex};
    use std::sync::Arc;

    const DIMENSION: usize = 8;
    const COLLECTION: &str = "ask_collection";

    async fn orchestrator(reply: &str) -> RetrievalOrchestrator {
        let embedder = Arc::new(MockEmbedder::new(DIMENSION));
        let index = Arc::new(InMemoryIndex::new());
        index
            .create_collection(COLLECTION, DIMENSION, DistanceMetric::L2)
            .await
            .unwrap();

        let text = "париж столица франции.";
        let embedding = embedder.embed(text).await.unwrap();
        index
            .add(
                COLLECTION,
                &[IndexRecord::new(
                    Document {
                        id: "42".to_string(),
                        text: text.to_string(),
                        source_page_id: "100".to_string(),
                    },
                    embedding,
                )],
            )
            .await
            .unwrap();

        RetrievalOrchestrator::new(
            embedder,
            index,
            Arc::new(MockCompletionService::new(reply)),
            OrchestratorSettings {
                collection: COLLECTION.to_string(),
                top_k: 10,
                max_tokens: 2048,
                temperature: 0.0,
            },
        )
    }

    #[tokio::test]
    async fn test_ask_once_prints_chunks_prompt_and_answer() {
        let orchestrator = orchestrator("<think>думаю</think>Париж").await;
        let mut output = Vec::new();

        ask_once(&orchestrator, "  Столица Франции?  ", None, &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("Запрос: Столица Франции?\n"));
        assert!(text.contains("1. UID: 42, расстояние: "));
        assert!(text.contains("Текст: париж столица франции."));
        assert!(text.contains("«Столица Франции?»"));
        assert!(text.trim_end().ends_with("Париж"));
        assert!(!text.contains("думаю"));
    }

    #[tokio::test]
    async fn test_session_skips_blank_lines_and_stops_at_exit() {
        let orchestrator = orchestrator("Париж").await;
        let input: &[u8] = "\n   \nСтолица Франции?\nEXIT\nне будет задан\n".as_bytes();
        let mut output = Vec::new();

        let answered = run_session(&orchestrator, Some(1), input, &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(answered, 1);
        assert_eq!(text.matches("Пожалуйста, введите непустой вопрос.").count(), 2);
        assert!(text.contains("Выход из программы."));
        assert!(!text.contains("не будет задан"));
    }

    #[tokio::test]
    async fn test_session_reports_failures_and_continues() {
        let orchestrator = orchestrator("Париж").await;
        let input: &[u8] = "первый вопрос\nвторой вопрос\n".as_bytes();
        let mut output = Vec::new();

        // top_k = 0 fails validation for every question
        let answered = run_session(&orchestrator, Some(0), input, &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(answered, 0);
        assert_eq!(text.matches("Ошибка: Validation failed").count(), 2);
    }

    #[tokio::test]
    async fn test_session_ends_at_end_of_input() {
        let orchestrator = orchestrator("Париж").await;
        let input: &[u8] = "Столица Франции?".as_bytes();
        let mut output = Vec::new();

        let answered = run_session(&orchestrator, None, input, &mut output)
            .await
            .unwrap();
        assert_eq!(answered, 1);
    }
}
