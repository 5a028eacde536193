//! Label generation for entity chunks.
//!
//! One chunk → one request to the label service → one validated
//! natural-language description. The response is cleaned (code fences,
//! stray formatting, surrounding whitespace) before validation, and only
//! transport failures are retried.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::ollama::LlmClient;
use super::LabellingError;
use crate::models::Chunk;

/// Fixed system instruction sent with every label request.
pub const LABEL_SYSTEM_PROMPT: &str = "\
You are a creative Architectural Designer Bot. Your task is to review a \
small list of extracted geometric entities and generate a single, highly \
descriptive natural language command that an architect would use to \
create them.

RULES:
1. Be descriptive (e.g., 'Draw a wall' instead of 'Draw a line').
2. Combine entities into a single coherent request.
3. Use English only.
4. Output ONLY the raw text command, nothing else.";

/// Transport-level retries per chunk (validation failures are final).
const LABEL_RETRIES: u32 = 2;

/// Strip code-fence markers and formatting noise from a raw model
/// response, leaving the bare command text.
pub fn sanitize_label(raw: &str) -> String {
    static CODE_FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"```[A-Za-z]*").expect("valid regex"));

    let text = CODE_FENCE_RE.replace_all(raw, "");
    text.replace("TEXT:", "").replace("\n\n", " ").trim().to_string()
}

/// Turns one chunk into a validated label via the configured LLM.
pub struct LabelGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    min_length: usize,
}

impl LabelGenerator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        temperature: f32,
        min_length: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            min_length,
        }
    }

    /// Generate and validate a label for `chunk`.
    pub fn generate_label(&self, chunk: &Chunk) -> Result<String, LabellingError> {
        let entities_json = serde_json::to_string_pretty(&chunk.entities)
            .map_err(|e| LabellingError::Serialize(e.to_string()))?;
        let prompt = format!("ENTITIES TO DESCRIBE:\n---\n{entities_json}\n---");

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .client
                .generate(&self.model, &prompt, LABEL_SYSTEM_PROMPT, self.temperature)
            {
                Ok(raw) => return self.validate(chunk.id, sanitize_label(&raw)),
                Err(e) if e.is_transport() && attempt <= LABEL_RETRIES => {
                    tracing::warn!(
                        chunk_id = chunk.id,
                        attempt,
                        error = %e,
                        "label request failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn validate(&self, chunk_id: usize, label: String) -> Result<String, LabellingError> {
        if label.is_empty() {
            return Err(LabellingError::Empty);
        }
        let len = label.chars().count();
        if len < self.min_length {
            return Err(LabellingError::TooShort {
                len,
                min: self.min_length,
            });
        }
        if label.to_lowercase().starts_with("error") {
            return Err(LabellingError::ErrorMarker(label));
        }

        tracing::debug!(chunk_id, label_len = len, "label accepted");
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::labelling::ollama::MockLlmClient;
    use crate::models::{Entity, Geometry, Point};

    fn test_chunk() -> Chunk {
        Chunk {
            id: 0,
            entities: vec![Entity::new(Geometry::Line {
                start: Point::new(0.0, 0.0),
                end: Point::new(100.0, 0.0),
            })],
        }
    }

    fn generator(client: Arc<dyn LlmClient>) -> LabelGenerator {
        LabelGenerator::new(client, "llama3", 0.7, 10)
    }

    // ── Sanitization ───────────────────────────────────────

    #[test]
    fn strips_code_fences_and_whitespace() {
        assert_eq!(
            sanitize_label("```\nDraw a long wall here\n```"),
            "Draw a long wall here"
        );
        assert_eq!(
            sanitize_label("```json\nDraw a circular column\n```"),
            "Draw a circular column"
        );
        assert_eq!(sanitize_label("  padded response  "), "padded response");
    }

    #[test]
    fn collapses_double_newlines() {
        assert_eq!(sanitize_label("Draw a wall\n\nwith a door"), "Draw a wall with a door");
    }

    // ── Validation ─────────────────────────────────────────

    #[test]
    fn accepts_valid_label_verbatim() {
        let gen = generator(Arc::new(MockLlmClient::new(
            "Draw a load-bearing wall across the north side",
        )));
        let label = gen.generate_label(&test_chunk()).unwrap();
        assert_eq!(label, "Draw a load-bearing wall across the north side");
    }

    #[test]
    fn rejects_empty_response() {
        let gen = generator(Arc::new(MockLlmClient::new("")));
        assert!(matches!(
            gen.generate_label(&test_chunk()),
            Err(LabellingError::Empty)
        ));
    }

    #[test]
    fn rejects_fence_only_response() {
        let gen = generator(Arc::new(MockLlmClient::new("```\n```")));
        assert!(matches!(
            gen.generate_label(&test_chunk()),
            Err(LabellingError::Empty)
        ));
    }

    #[test]
    fn rejects_short_label() {
        let gen = generator(Arc::new(MockLlmClient::new("too short")));
        assert!(matches!(
            gen.generate_label(&test_chunk()),
            Err(LabellingError::TooShort { len: 9, min: 10 })
        ));
    }

    #[test]
    fn rejects_error_marker_case_insensitively() {
        for response in ["Error: model overloaded", "ERROR - cannot comply", "error occurred here"] {
            let gen = generator(Arc::new(MockLlmClient::new(response)));
            assert!(
                matches!(
                    gen.generate_label(&test_chunk()),
                    Err(LabellingError::ErrorMarker(_))
                ),
                "expected rejection for {response:?}"
            );
        }
    }

    #[test]
    fn boundary_length_is_accepted() {
        // Exactly min_length characters.
        let gen = generator(Arc::new(MockLlmClient::new("abcdefghij")));
        assert!(gen.generate_label(&test_chunk()).is_ok());
    }

    // ── Retry policy ───────────────────────────────────────

    /// Client that fails with a transport error a fixed number of times
    /// before succeeding, counting every call.
    struct FlakyClient {
        failures: u32,
        calls: AtomicU32,
    }

    impl LlmClient for FlakyClient {
        fn generate(&self, _: &str, _: &str, _: &str, _: f32) -> Result<String, LabellingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(LabellingError::Connection("http://localhost:11434".into()))
            } else {
                Ok("Draw a curved partition wall".into())
            }
        }

        fn is_model_available(&self, _: &str) -> Result<bool, LabellingError> {
            Ok(true)
        }

        fn list_models(&self) -> Result<Vec<String>, LabellingError> {
            Ok(vec![])
        }
    }

    #[test]
    fn transport_errors_are_retried() {
        let client = Arc::new(FlakyClient {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let gen = generator(client.clone());
        let label = gen.generate_label(&test_chunk()).unwrap();
        assert_eq!(label, "Draw a curved partition wall");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retries_are_bounded() {
        let client = Arc::new(FlakyClient {
            failures: 99,
            calls: AtomicU32::new(0),
        });
        let gen = generator(client.clone());
        assert!(matches!(
            gen.generate_label(&test_chunk()),
            Err(LabellingError::Connection(_))
        ));
        // 1 initial attempt + 2 retries
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    /// Validation failures must not burn retries.
    struct CountingErrorClient {
        calls: AtomicU32,
    }

    impl LlmClient for CountingErrorClient {
        fn generate(&self, _: &str, _: &str, _: &str, _: f32) -> Result<String, LabellingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Error: model overloaded".into())
        }

        fn is_model_available(&self, _: &str) -> Result<bool, LabellingError> {
            Ok(true)
        }

        fn list_models(&self) -> Result<Vec<String>, LabellingError> {
            Ok(vec![])
        }
    }

    #[test]
    fn validation_failures_are_not_retried() {
        let client = Arc::new(CountingErrorClient {
            calls: AtomicU32::new(0),
        });
        let gen = generator(client.clone());
        assert!(gen.generate_label(&test_chunk()).is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prompt_carries_serialized_entities() {
        struct PromptCapture {
            seen: std::sync::Mutex<String>,
        }
        impl LlmClient for PromptCapture {
            fn generate(
                &self,
                _: &str,
                prompt: &str,
                system: &str,
                _: f32,
            ) -> Result<String, LabellingError> {
                *self.seen.lock().unwrap() = prompt.to_string();
                assert!(system.contains("Architectural Designer Bot"));
                Ok("Draw a straight corridor wall".into())
            }
            fn is_model_available(&self, _: &str) -> Result<bool, LabellingError> {
                Ok(true)
            }
            fn list_models(&self) -> Result<Vec<String>, LabellingError> {
                Ok(vec![])
            }
        }

        let client = Arc::new(PromptCapture {
            seen: std::sync::Mutex::new(String::new()),
        });
        let gen = generator(client.clone());
        gen.generate_label(&test_chunk()).unwrap();

        let prompt = client.seen.lock().unwrap();
        assert!(prompt.contains("\"type\": \"LINE\""));
        assert!(prompt.contains("ENTITIES TO DESCRIBE"));
    }
}
