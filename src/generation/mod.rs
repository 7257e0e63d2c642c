//! Answer generation: grounded, streaming responses from a language model.
//!
//! The model is an external capability; this module defines the prompt
//! contract and the streaming contract, plus the Gemini implementation.
//! Streaming is a producer/consumer channel of text deltas: the caller
//! drives consumption and may drop the stream at any point, which stops
//! the producer without side effects on stored state.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::document::{ChatMessage, Role};
use crate::embedding::get_api_key;
use crate::error::RagError;
use crate::knowledge::ContextBlock;

// ============================================================================
// Contracts
// ============================================================================

/// What one generation call needs: system instructions (carrying the
/// grounding context) and the full conversation history.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_instructions: String,
    pub history: Vec<ChatMessage>,
}

/// Lazy sequence of answer deltas. Dropping the receiver cancels the
/// upstream generation call.
pub type AnswerStream = mpsc::Receiver<Result<String, RagError>>;

/// Interface for producing a grounded answer.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the complete answer atomically.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, RagError>;

    /// Streams the answer incrementally as it becomes available.
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<AnswerStream, RagError>;

    /// Provider name.
    fn name(&self) -> &str;
}

// ============================================================================
// Prompt Contract
// ============================================================================

/// The fallback sentence the model must use when the context cannot
/// answer the question.
pub const INSUFFICIENT_CONTEXT_FALLBACK: &str =
    "The provided documents do not contain enough information to answer this question.";

/// Builds the grounding system prompt around an assembled context block.
///
/// The instructions enumerate the contract: answer strictly from context,
/// structured formatting, a terminal deduplicated source list, and the
/// explicit insufficient-information fallback.
pub fn build_system_prompt(context: &ContextBlock) -> String {
    let sources = if context.sources.is_empty() {
        "(none)".to_string()
    } else {
        context
            .sources
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are a highly knowledgeable AI assistant. Your role is to answer user \
         queries strictly based on the provided context retrieved from documents or \
         web pages.\n\n\
         Guidelines:\n\
         1. Use ONLY the information from the given context to answer. If the answer \
         is not present in the context, say clearly: \"{fallback}\"\n\
         2. Present answers in a clean, well-structured format: use numbered lists or \
         bullet points for steps, and code blocks for code snippets.\n\
         3. At the END of your answer, provide a \"Sources\" section listing the \
         relevant sources from the list below, deduplicated.\n\
         4. Maintain a professional, simple tone so answers are easy to understand.\n\
         5. If multiple sources overlap, merge them logically instead of repeating.\n\n\
         Available sources:\n{sources}\n\n\
         Context (from retrieved documents):\n{context}",
        fallback = INSUFFICIENT_CONTEXT_FALLBACK,
        sources = sources,
        context = context.text,
    )
}

/// System prompt for the optional free-text normalization pass applied
/// before chunking manual text input.
pub const TEXT_NORMALIZE_PROMPT: &str =
    "You are an AI assistant that converts the user's text into proper format. \
     Correct typos, arrange words properly if they are not, and make the text \
     meaningful. Return only the corrected text.";

// ============================================================================
// Google Gemini Generator
// ============================================================================

const GEMINI_GENERATE_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default generation model (matches the embedding provider's family).
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash";

/// Streaming delta channel depth; the producer blocks when the consumer
/// falls this far behind.
const STREAM_BUFFER: usize = 32;

/// Gemini REST generator with SSE streaming.
pub struct GeminiGenerator {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String) -> Result<Self, RagError> {
        Self::with_model(api_key, DEFAULT_GENERATION_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                RagError::GenerationUnavailable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            api_key,
            client,
            model,
        })
    }

    /// Reads the API key from `GEMINI_API_KEY` or `GOOGLE_AI_API_KEY`.
    pub fn from_env() -> Result<Self, RagError> {
        let api_key =
            get_api_key().map_err(|e| RagError::GenerationUnavailable(e.to_string()))?;
        Self::new(api_key)
    }

    fn build_body(request: &GenerationRequest) -> GenerateBody {
        let mut system = request.system_instructions.clone();
        let mut contents = Vec::new();

        for message in &request.history {
            match message.role {
                // Gemini only knows user/model turns; fold stray system
                // turns into the system instructions.
                Role::System => {
                    system.push_str("\n\n");
                    system.push_str(&message.content);
                }
                Role::User => contents.push(Content {
                    role: "user",
                    parts: vec![Part {
                        text: message.content.clone(),
                    }],
                }),
                Role::Assistant => contents.push(Content {
                    role: "model",
                    parts: vec![Part {
                        text: message.content.clone(),
                    }],
                }),
            }
        }

        GenerateBody {
            system_instruction: Content {
                role: "user",
                parts: vec![Part { text: system }],
            },
            contents,
        }
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        streaming: bool,
    ) -> Result<reqwest::Response, RagError> {
        let url = if streaming {
            format!(
                "{GEMINI_GENERATE_BASE}/{}:streamGenerateContent?alt=sse",
                self.model
            )
        } else {
            format!("{GEMINI_GENERATE_BASE}/{}:generateContent", self.model)
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| RagError::GenerationUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::GenerationUnavailable(format!(
                "Gemini API error ({status}): {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, RagError> {
        let response = self.send(request, false).await?;
        let body = response
            .text()
            .await
            .map_err(|e| RagError::GenerationUnavailable(e.to_string()))?;

        delta_from_json(&body).ok_or_else(|| {
            RagError::GenerationUnavailable("response carried no answer text".to_string())
        })
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<AnswerStream, RagError> {
        let response = self.send(request, true).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            'outer: while let Some(next) = stream.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(RagError::GenerationUnavailable(format!(
                                "stream error: {e}"
                            ))))
                            .await;
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // SSE events arrive as "data: {json}" lines; chunks may
                // split a line, so only complete lines are parsed.
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    if let Some(delta) = sse_data(line.trim_end()).and_then(delta_from_json) {
                        // Receiver dropped: caller cancelled, stop consuming.
                        if tx.send(Ok(delta)).await.is_err() {
                            break 'outer;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// SSE Parsing
// ============================================================================

/// Extracts the payload of an SSE `data:` line.
fn sse_data(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(payload)
}

/// Pulls the concatenated candidate text out of one response payload.
fn delta_from_json(json: &str) -> Option<String> {
    let parsed: GenerateResponse = serde_json::from_str(json).ok()?;
    let parts = parsed.candidates.into_iter().next()?.content?.parts;
    let text: String = parts.into_iter().filter_map(|p| p.text).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateBody {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_carries_the_contract() {
        let context = ContextBlock {
            text: "Paris is the capital of France.".to_string(),
            sources: vec!["manual-text-input".to_string()],
        };
        let prompt = build_system_prompt(&context);

        assert!(prompt.contains("ONLY the information from the given context"));
        assert!(prompt.contains(INSUFFICIENT_CONTEXT_FALLBACK));
        assert!(prompt.contains("Sources"));
        assert!(prompt.contains("- manual-text-input"));
        assert!(prompt.contains("Paris is the capital of France."));
    }

    #[test]
    fn test_system_prompt_with_empty_context() {
        let prompt = build_system_prompt(&ContextBlock::default());
        assert!(prompt.contains("(none)"));
    }

    #[test]
    fn test_body_maps_roles_and_folds_system_turns() {
        let request = GenerationRequest {
            system_instructions: "base instructions".to_string(),
            history: vec![
                ChatMessage {
                    role: Role::System,
                    content: "extra rule".to_string(),
                },
                ChatMessage::user("question"),
                ChatMessage::assistant("earlier answer"),
                ChatMessage::user("follow-up"),
            ],
        };

        let body = GeminiGenerator::build_body(&request);
        assert!(body.system_instruction.parts[0].text.contains("base instructions"));
        assert!(body.system_instruction.parts[0].text.contains("extra rule"));

        let roles: Vec<&str> = body.contents.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[test]
    fn test_sse_data_extraction() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data: [DONE]"), None);
        assert_eq!(sse_data("event: ping"), None);
        assert_eq!(sse_data(""), None);
    }

    #[test]
    fn test_delta_from_json() {
        let payload = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Paris is "}, {"text": "the capital."}]}}
            ]
        }"#;
        assert_eq!(delta_from_json(payload), Some("Paris is the capital.".to_string()));

        assert_eq!(delta_from_json(r#"{"candidates": []}"#), None);
        assert_eq!(delta_from_json("not json"), None);
    }
}
