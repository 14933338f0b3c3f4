use crate::classifier::{ClassificationOracle, OracleAnswer, OracleRequest};
use crate::error::{Result, TransformError};
use crate::llm::client::{GeminiClient, GeminiConfig};
use crate::llm::prompts::{classification_prompt, SYSTEM_PROMPT_CLASSIFY};
use crate::llm::types::Content;
use crate::utils::strip_code_fence;
use async_trait::async_trait;
use log::debug;
use schemars::schema_for;

/// Classification oracle backed by a Gemini model.
pub struct GeminiOracle {
    client: GeminiClient,
    model: String,
    schema: serde_json::Value,
}

impl GeminiOracle {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Result<Self> {
        let schema = serde_json::to_value(schema_for!(OracleAnswer))?;
        Ok(Self {
            client,
            model: model.into(),
            schema: sanitize_schema(schema),
        })
    }

    pub fn from_config(config: GeminiConfig) -> Result<Self> {
        Self::new(GeminiClient::new(config.api_key), config.model)
    }
}

/// Gemini rejects the JSON-schema meta keys schemars emits.
fn sanitize_schema(mut schema: serde_json::Value) -> serde_json::Value {
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
        map.remove("title");
    }
    schema
}

pub fn parse_answer(raw: &str) -> Result<OracleAnswer> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        TransformError::Oracle(format!("malformed oracle response '{}': {}", raw.trim(), e))
    })
}

#[async_trait]
impl ClassificationOracle for GeminiOracle {
    async fn classify(&self, request: &OracleRequest) -> Result<OracleAnswer> {
        let raw = self
            .client
            .generate_content(
                &self.model,
                SYSTEM_PROMPT_CLASSIFY,
                vec![Content::user_text(classification_prompt(request))],
                Some(self.schema.clone()),
            )
            .await?;
        debug!("Gemini answered for '{}': {}", request.name, raw.trim());
        parse_answer(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer_strips_fences() {
        let raw = "```json\n{\"category\":\"Assets\",\"subcategory_1\":\"Non-Current Assets\",\"subcategory_2\":\"Intangible Assets\"}\n```";
        let answer = parse_answer(raw).unwrap();
        assert_eq!(answer.subcategory_2, "Intangible Assets");
        assert!(answer.resolve().is_some());
    }

    #[test]
    fn test_parse_answer_rejects_prose() {
        assert!(matches!(
            parse_answer("I think this is an intangible asset."),
            Err(TransformError::Oracle(_))
        ));
    }

    #[test]
    fn test_schema_is_sanitized() {
        let oracle = GeminiOracle::new(GeminiClient::new("key".to_string()), "model").unwrap();
        assert!(oracle.schema.get("$schema").is_none());
        assert!(oracle.schema["properties"].get("subcategory_1").is_some());
    }
}
