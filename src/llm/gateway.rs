use super::prompts::{code_summary_prompt, diff_summary_prompt, truncate_chars};
use super::{LanguageModel, TextStream};
use crate::error::LlmError;
use crate::rate_limit::{RateLimitedExecutor, RetryPolicy, retry_with_backoff};
use std::sync::Arc;

/// Rate-limited access to a [`LanguageModel`]
///
/// Every summary and embedding request is queued on the shared executor and
/// retried with exponential backoff while the provider reports a rate limit.
/// Answer streams bypass the queue: they are user-facing and open one
/// connection per question.
#[derive(Clone)]
pub struct LlmGateway {
    model: Arc<dyn LanguageModel>,
    executor: Arc<RateLimitedExecutor>,
    retry: RetryPolicy,
}

impl LlmGateway {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        executor: Arc<RateLimitedExecutor>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            executor,
            retry,
        }
    }

    pub fn embedding_dimension(&self) -> usize {
        self.model.embedding_dimension()
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    async fn generate(&self, prompt: String) -> Result<String, LlmError> {
        let model = &self.model;
        let prompt = prompt.as_str();
        self.executor
            .enqueue(|| retry_with_backoff(&self.retry, || model.generate(prompt)))
            .await
            .map_err(LlmError::from)
    }

    /// Summarize the first `max_chars` characters of a source file
    pub async fn summarize_code(
        &self,
        file_name: &str,
        content: &str,
        max_chars: usize,
    ) -> Result<String, LlmError> {
        let code = truncate_chars(content, max_chars);
        tracing::debug!("Summarizing {} ({} chars)", file_name, code.chars().count());
        self.generate(code_summary_prompt(file_name, code)).await
    }

    /// Summarize a unified diff
    pub async fn summarize_diff(&self, diff: &str) -> Result<String, LlmError> {
        self.generate(diff_summary_prompt(diff)).await
    }

    /// Embed a text, rejecting vectors of the wrong length
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = &self.model;
        let vector = self
            .executor
            .enqueue(|| retry_with_backoff(&self.retry, || model.embed(text)))
            .await
            .map_err(LlmError::from)?;

        let expected = self.model.embedding_dimension();
        if vector.len() != expected {
            return Err(LlmError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Open a streamed answer for a fully built prompt
    pub async fn stream_answer(&self, prompt: &str) -> Result<TextStream, LlmError> {
        self.model.stream(prompt).await
    }
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("model", &self.model.model_name())
            .field("executor", &self.executor)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Default)]
    struct ScriptedModel {
        prompts: Mutex<Vec<String>>,
        call_times: Mutex<Vec<Instant>>,
        rate_limited_calls: Mutex<u32>,
        dimension: usize,
        returned_dimension: usize,
    }

    impl ScriptedModel {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                returned_dimension: dimension,
                ..Default::default()
            }
        }

        fn record(&self, prompt: &str) -> Result<(), LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.call_times.lock().unwrap().push(Instant::now());
            let mut remaining = self.rate_limited_calls.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LlmError::RateLimited {
                    status: 429,
                    message: "slow down".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.record(prompt)?;
            Ok("a summary".to_string())
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            self.record(text)?;
            Ok(vec![0.5; self.returned_dimension])
        }

        async fn stream(&self, _prompt: &str) -> Result<TextStream, LlmError> {
            let chunks = vec![Ok("one ".to_string()), Ok("two".to_string())];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        fn embedding_dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn gateway(model: Arc<ScriptedModel>, spacing_ms: u64) -> LlmGateway {
        LlmGateway::new(
            model,
            Arc::new(RateLimitedExecutor::new(Duration::from_millis(spacing_ms))),
            RetryPolicy::new(3, Duration::from_millis(100)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_summarize_code_truncates_source() {
        let model = Arc::new(ScriptedModel::new(4));
        let gateway = gateway(model.clone(), 0);

        let content = "x".repeat(5000);
        let summary = gateway
            .summarize_code("src/lib.rs", &content, 1000)
            .await
            .unwrap();
        assert_eq!(summary, "a summary");

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains(&"x".repeat(1000)));
        assert!(!prompts[0].contains(&"x".repeat(1001)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_share_one_queue() {
        let model = Arc::new(ScriptedModel::new(4));
        let gateway = gateway(model.clone(), 2000);

        let (a, b, c) = tokio::join!(
            gateway.summarize_code("a.rs", "fn a() {}", 1000),
            gateway.embed("summary"),
            gateway.summarize_diff("+line"),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());

        let times = model.call_times.lock().unwrap();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(2000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_inside_queue_slot() {
        let model = Arc::new(ScriptedModel::new(4));
        *model.rate_limited_calls.lock().unwrap() = 2;
        let gateway = gateway(model.clone(), 0);

        let vector = gateway.embed("summary").await.unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(model.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_flatten_to_llm_error() {
        let model = Arc::new(ScriptedModel::new(4));
        *model.rate_limited_calls.lock().unwrap() = 10;
        let gateway = gateway(model.clone(), 0);

        let err = gateway.summarize_diff("+x").await.unwrap_err();
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_embed_rejects_wrong_dimension() {
        let model = Arc::new(ScriptedModel {
            returned_dimension: 3,
            ..ScriptedModel::new(4)
        });
        let gateway = gateway(model, 0);

        let err = gateway.embed("summary").await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_stream_answer_passes_through() {
        let model = Arc::new(ScriptedModel::new(4));
        let gateway = gateway(model.clone(), 60_000);

        let chunks: Vec<String> = gateway
            .stream_answer("prompt")
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.join(""), "one two");
        assert!(model.prompts.lock().unwrap().is_empty());
    }
}
