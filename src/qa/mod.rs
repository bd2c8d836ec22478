//! Retrieval-augmented answers about an indexed project
//!
//! A question is embedded with the same model used for file summaries, the
//! closest summaries of the project are retrieved, and the answer model is
//! streamed a prompt that only contains those files.

use crate::error::{LlmError, ValidationError};
use crate::llm::prompts::{REFUSAL, answer_prompt, truncate_chars};
use crate::llm::{LlmGateway, TextStream};
use crate::store::{SimilarityMatch, VectorStore};
use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

/// A file the answer was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileReference {
    pub file_name: String,
    pub summary: String,
    pub source_code: String,
    pub similarity: f32,
}

impl From<SimilarityMatch> for FileReference {
    fn from(m: SimilarityMatch) -> Self {
        Self {
            file_name: m.file_name,
            summary: m.summary,
            source_code: m.source_code,
            similarity: m.similarity,
        }
    }
}

/// Answer text as it arrives from the model
pub struct AnswerStream {
    inner: TextStream,
}

impl AnswerStream {
    fn new(inner: TextStream) -> Self {
        Self { inner }
    }

    /// A stream that only yields the refusal reply
    pub fn refusal() -> Self {
        Self::new(Box::pin(futures::stream::iter([Ok::<_, LlmError>(REFUSAL.to_string())])))
    }

    /// Wait for the whole answer
    pub async fn collect_text(mut self) -> Result<String, LlmError> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

impl Stream for AnswerStream {
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream").finish_non_exhaustive()
    }
}

/// A streamed answer plus the files it was drawn from
#[derive(Debug)]
pub struct Answer {
    pub stream: AnswerStream,
    pub file_references: Vec<FileReference>,
}

/// Retrieval settings for [`QuestionAnswerer`]
#[derive(Debug, Clone, Copy)]
pub struct RetrievalLimits {
    pub min_similarity: f32,
    pub limit: usize,
    pub max_context_chars: usize,
}

impl From<&crate::config::SearchConfig> for RetrievalLimits {
    fn from(config: &crate::config::SearchConfig) -> Self {
        Self {
            min_similarity: config.min_similarity,
            limit: config.limit,
            max_context_chars: config.max_context_chars,
        }
    }
}

pub struct QuestionAnswerer {
    gateway: LlmGateway,
    store: Arc<dyn VectorStore>,
    limits: RetrievalLimits,
}

impl QuestionAnswerer {
    pub fn new(gateway: LlmGateway, store: Arc<dyn VectorStore>, limits: RetrievalLimits) -> Self {
        Self {
            gateway,
            store,
            limits,
        }
    }

    /// Answer `question` from the files indexed for `project_id`
    ///
    /// Embedding and search failures are returned before any stream is
    /// opened. When nothing relevant is indexed the model is not called and
    /// the stream carries only the refusal reply.
    pub async fn answer(&self, question: &str, project_id: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::Empty("question".to_string()).into());
        }

        let query = self
            .gateway
            .embed(question)
            .await
            .context("Failed to embed question")?;

        let matches = self
            .store
            .search(
                project_id,
                &query,
                self.limits.min_similarity,
                self.limits.limit,
            )
            .await
            .with_context(|| format!("Failed to search project {}", project_id))?;

        let (context, used) = build_context(&matches, self.limits.max_context_chars);
        tracing::info!(
            "Answering from {} of {} matching files in project {}",
            used,
            matches.len(),
            project_id
        );

        let file_references: Vec<FileReference> = matches
            .into_iter()
            .take(used)
            .map(FileReference::from)
            .collect();

        if file_references.is_empty() {
            return Ok(Answer {
                stream: AnswerStream::refusal(),
                file_references,
            });
        }

        let stream = self
            .gateway
            .stream_answer(&answer_prompt(&context, question))
            .await
            .context("Failed to open answer stream")?;

        Ok(Answer {
            stream: AnswerStream::new(stream),
            file_references,
        })
    }
}

fn context_block(m: &SimilarityMatch) -> String {
    format!(
        "File Name: {}\nSummary: {}\nCode:\n{}\n\n",
        m.file_name, m.summary, m.source_code
    )
}

/// Concatenate match blocks, best first, until `max_chars` would be exceeded
///
/// Returns the context and how many matches it covers. A first block that
/// alone exceeds the bound is truncated rather than dropped.
pub(crate) fn build_context(matches: &[SimilarityMatch], max_chars: usize) -> (String, usize) {
    let mut context = String::new();
    let mut length = 0;
    let mut used = 0;

    for m in matches {
        let block = context_block(m);
        let block_len = block.chars().count();
        if length + block_len > max_chars {
            if used == 0 && max_chars > 0 {
                context.push_str(truncate_chars(&block, max_chars));
                used = 1;
            }
            break;
        }
        context.push_str(&block);
        length += block_len;
        used += 1;
    }

    (context, used)
}
