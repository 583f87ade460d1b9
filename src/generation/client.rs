use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::generation::guardrails::{tag_violations, TAGS_MAX, TAGS_MIN};
use crate::generation::schema::{GenerationMetadata, IdeaRequest, IdeaResponse, ScriptBeats};
use crate::types::TraceId;

/// Backend that turns trend keywords into titles, tags and a script.
#[async_trait]
pub trait IdeaModelClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate_ideas(&self, request: &IdeaRequest, trace_id: &TraceId) -> Result<IdeaResponse>;
}

pub const STUB_MODEL: &str = "stub-client";

const FALLBACK_KEYWORD: &str = "트렌드";
const KEYWORD_MAX_CHARS: usize = 6;
const FILLER_TAGS: &[&str] = &["#분석", "#정보", "#트렌드", "#리뷰", "#이슈"];

/// Offline client with template output. Used in development and whenever no model
/// backend is configured; its output always passes the guardrails.
#[derive(Debug, Default, Clone)]
pub struct StubModelClient;

impl StubModelClient {
    pub fn new() -> Self {
        Self
    }

    fn compose(keyword: &str, request: &IdeaRequest) -> IdeaResponse {
        let titles = vec![
            format!("{keyword} 최신 정보와 전문가 분석 결과 총정리"),
            format!("이번 주 {keyword} 주요 동향과 핵심 포인트 살펴보기"),
            format!("{keyword} 관련 소식과 향후 전망 완벽 분석"),
            format!("전문가가 말하는 {keyword} 트렌드와 시장 분석"),
        ];

        IdeaResponse {
            titles,
            tags: stub_tags(&request.keywords),
            script_beats: ScriptBeats {
                hook: Some(format!("안녕하세요! 오늘은 {keyword}에 대한 흥미로운 소식을 가져왔습니다.")),
                body: Some(format!(
                    "{keyword} 관련 최신 동향을 정리했습니다. 핵심 변화와 주목할 포인트를 차례로 \
                     살펴보고 알아두면 좋을 정보를 쉽게 전해드리겠습니다."
                )),
                cta: Some("도움이 되셨다면 구독과 좋아요 부탁드려요!".to_string()),
            },
            metadata: GenerationMetadata {
                model: STUB_MODEL.to_string(),
                ..Default::default()
            },
        }
    }
}

/// The first keyword cut to a length every title template can hold.
fn lead_keyword(keywords: &[String]) -> String {
    keywords
        .iter()
        .map(|k| k.trim())
        .find(|k| !k.is_empty())
        .map(|k| k.chars().take(KEYWORD_MAX_CHARS).collect::<String>())
        .unwrap_or_else(|| FALLBACK_KEYWORD.to_string())
}

/// Keyword tags that pass the per-tag rules, topped up with filler tags.
fn stub_tags(keywords: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for kw in keywords {
        let tag = format!("#{}", kw.split_whitespace().collect::<String>());
        if tags.len() < TAGS_MAX && !tags.contains(&tag) && tag_violations(tags.len() + 1, &tag).is_empty() {
            tags.push(tag);
        }
    }
    for filler in FILLER_TAGS {
        if tags.len() >= TAGS_MIN {
            break;
        }
        if !tags.iter().any(|t| t == filler) {
            tags.push(filler.to_string());
        }
    }
    tags
}

#[async_trait]
impl IdeaModelClient for StubModelClient {
    fn model_name(&self) -> &str {
        STUB_MODEL
    }

    async fn generate_ideas(&self, request: &IdeaRequest, trace_id: &TraceId) -> Result<IdeaResponse> {
        let keyword = lead_keyword(&request.keywords);
        let mut response = Self::compose(&keyword, request);

        // Keywords carrying banned words or digits fall back to the neutral topic.
        if !response.violations().is_empty() {
            debug!(trace_id = %trace_id, keyword = %keyword, "Stub keyword rejected by guardrails, using fallback");
            response = Self::compose(FALLBACK_KEYWORD, request);
        }

        debug!(
            trace_id = %trace_id,
            titles = response.titles.len(),
            tags = response.tags.len(),
            "Stub ideas generated"
        );
        Ok(response)
    }
}
