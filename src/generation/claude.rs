use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{
    Config, ANTHROPIC_VERSION, GENERATION_BACKOFF_MS, GENERATION_MAX_ATTEMPTS, MODEL_HTTP_TIMEOUT_SECS,
    MODEL_MAX_TOKENS,
};
use crate::error::{AppError, Result};
use crate::generation::client::IdeaModelClient;
use crate::generation::schema::{GenerationMetadata, IdeaRequest, IdeaResponse};
use crate::types::TraceId;

/// Idea generation backed by the Anthropic Messages API.
pub struct ClaudeClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ClaudeClient {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(MODEL_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let key = cfg
            .anthropic_api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;
        Self::new(&cfg.anthropic_api_url, key, &cfg.claude_model)
    }

    async fn call_api(&self, request: &IdeaRequest) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "max_tokens": MODEL_MAX_TOKENS,
            "messages": [{ "role": "user", "content": build_prompt(request) }],
        });

        let resp: MessagesResponse = self
            .http
            .post(format!("{}/v1/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        resp.content
            .into_iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text)
            .ok_or_else(|| AppError::Dependency("Model reply had no text content".to_string()))
    }

    async fn attempt(&self, request: &IdeaRequest) -> Result<IdeaResponse> {
        let text = self.call_api(request).await?;
        let response = parse_response(&text)?;
        response.check()?;
        Ok(response)
    }
}

#[async_trait]
impl IdeaModelClient for ClaudeClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_ideas(&self, request: &IdeaRequest, trace_id: &TraceId) -> Result<IdeaResponse> {
        let mut last_err = None;

        for attempt in 0..GENERATION_MAX_ATTEMPTS {
            if attempt > 0 {
                let idx = (attempt as usize - 1).min(GENERATION_BACKOFF_MS.len() - 1);
                tokio::time::sleep(Duration::from_millis(GENERATION_BACKOFF_MS[idx])).await;
            }

            let started = Instant::now();
            match self.attempt(request).await {
                Ok(mut response) => {
                    let generation_time = started.elapsed().as_secs_f64();
                    info!(
                        trace_id = %trace_id,
                        attempt = attempt + 1,
                        generation_time,
                        "Content generation successful"
                    );
                    response.metadata = GenerationMetadata {
                        model: self.model.clone(),
                        safety_flags: Vec::new(),
                        generation_time,
                        retry_count: attempt,
                    };
                    return Ok(response);
                }
                Err(e) => {
                    warn!(trace_id = %trace_id, attempt = attempt + 1, "Generation attempt failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            // The model answered but kept breaking the content rules.
            Some(AppError::Validation(msg)) => Err(AppError::Validation(msg)),
            other => {
                let last = other.map(|e| e.to_string()).unwrap_or_default();
                Err(AppError::Dependency(format!(
                    "All {GENERATION_MAX_ATTEMPTS} generation attempts failed. Last error: {last}"
                )))
            }
        }
    }
}

pub fn build_prompt(request: &IdeaRequest) -> String {
    let keywords = request.keywords.join(", ");
    let signals = request
        .signals
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ");
    let style = request
        .style
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r##"YouTube 콘텐츠 아이디어를 생성해주세요.

입력 정보:
- 키워드: {keywords}
- 신호: {signals}
- 스타일: {style}

요구사항:
1. 제목 3-5개 (20-35자, 이모지 최대 1개, 낚시성 금지)
2. 태그 5-10개 (#으로 시작, 핵심 키워드 포함)
3. 스크립트 구조 (Hook, Body, CTA)

JSON 형태로 응답:
{{
  "titles": ["제목1", "제목2", "제목3"],
  "tags": ["#태그1", "#태그2", "#태그3", "#태그4", "#태그5"],
  "script_beats": {{
    "hook": "시청자 관심을 끄는 첫 15초 내용",
    "body": "핵심 정보를 전달하는 메인 내용",
    "cta": "구독과 좋아요를 유도하는 마무리"
  }}
}}

주의사항:
- 사실 기반으로 작성
- 과도한 과장 금지
- 한국어 사용
"##
    )
}

/// The outermost `{...}` span of a reply, which may wrap the object in prose.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

pub fn parse_response(text: &str) -> Result<IdeaResponse> {
    let json = extract_json(text)
        .ok_or_else(|| AppError::Dependency("No JSON object found in model reply".to_string()))?;
    Ok(serde_json::from_str(json)?)
}
