//! AI scene feedback and grammar checking.
//!
//! The generation service sits behind [`FeedbackService`]. Requests and
//! responses are plain serde types using the collaborator's camelCase wire
//! names; errors carry a status class and a message that callers show as-is.

use async_trait::async_trait;
use claude::{Claude, Message, Request};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::strip_tags;

const MISSING_SCENE_CONTENT: &str = "씬 내용이 필요합니다.";
const MISSING_CONTENT: &str = "내용이 필요합니다.";
const FEEDBACK_FAILED: &str = "AI 피드백 생성에 실패했습니다.";
const GRAMMAR_FAILED: &str = "문법 검사에 실패했습니다.";
const NO_CHARACTERS: &str = "정보 없음";

// =========================================================================
// Wire types
// =========================================================================

/// Request for editorial feedback on one scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    #[serde(default)]
    pub scene_content: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub characters: Vec<String>,
}

impl FeedbackRequest {
    /// Reject requests without scene text.
    pub fn validate(&self) -> Result<(), FeedbackError> {
        if self.scene_content.is_empty() {
            return Err(FeedbackError::client(MISSING_SCENE_CONTENT));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub feedback: String,
}

/// Request for a spelling and grammar pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrammarRequest {
    #[serde(default)]
    pub content: String,
}

impl GrammarRequest {
    pub fn validate(&self) -> Result<(), FeedbackError> {
        if self.content.is_empty() {
            return Err(FeedbackError::client(MISSING_CONTENT));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarResponse {
    pub suggestions: String,
}

/// Status class of a failed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackStatus {
    /// Required input missing (400).
    ClientError,
    /// Generation failed upstream (500).
    #[default]
    ServerError,
}

impl FeedbackStatus {
    /// The HTTP status code this class maps to.
    pub fn code(self) -> u16 {
        match self {
            FeedbackStatus::ClientError => 400,
            FeedbackStatus::ServerError => 500,
        }
    }
}

/// Error body `{ "error": ... }` plus its status class.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{error}")]
pub struct FeedbackError {
    #[serde(skip)]
    pub status: FeedbackStatus,
    pub error: String,
}

impl FeedbackError {
    pub fn client(error: impl Into<String>) -> Self {
        Self {
            status: FeedbackStatus::ClientError,
            error: error.into(),
        }
    }

    pub fn server(error: impl Into<String>) -> Self {
        Self {
            status: FeedbackStatus::ServerError,
            error: error.into(),
        }
    }
}

/// The generation collaborator.
#[async_trait]
pub trait FeedbackService: Send + Sync {
    async fn feedback(&self, request: FeedbackRequest) -> Result<FeedbackResponse, FeedbackError>;

    async fn grammar(&self, request: GrammarRequest) -> Result<GrammarResponse, FeedbackError>;
}

// =========================================================================
// Prompts
// =========================================================================

/// Build the editorial feedback prompt.
pub fn feedback_prompt(request: &FeedbackRequest) -> String {
    let characters = if request.characters.is_empty() {
        NO_CHARACTERS.to_string()
    } else {
        request.characters.join(", ")
    };

    format!(
        "당신은 전문 소설 편집자입니다. 다음 정보를 바탕으로 씬에 대한 건설적인 피드백을 제공해주세요.\n\n\
         **시놉시스:**\n{synopsis}\n\n\
         **등장인물:**\n{characters}\n\n\
         **씬 내용:**\n{scene}\n\n\
         다음 항목에 대해 피드백을 제공해주세요:\n\
         1. 시놉시스와의 일관성\n\
         2. 캐릭터의 행동과 대사가 설정에 부합하는지\n\
         3. 문장 흐름과 가독성\n\
         4. 개선할 수 있는 부분\n\n\
         피드백은 한국어로, 친절하고 건설적인 톤으로 작성해주세요.",
        synopsis = request.synopsis,
        scene = strip_tags(&request.scene_content),
    )
}

/// Build the grammar check prompt.
pub fn grammar_prompt(request: &GrammarRequest) -> String {
    format!(
        "다음 텍스트의 맞춤법과 문법을 검토하고, 발견된 오류를 수정해주세요.\n\n\
         **원문:**\n{}\n\n\
         발견된 오류와 제안을 간결하게 나열해주세요. \
         오류가 없다면 \"맞춤법 및 문법 오류가 발견되지 않았습니다.\"라고 응답해주세요.",
        strip_tags(&request.content)
    )
}

// =========================================================================
// Claude-backed service
// =========================================================================

/// [`FeedbackService`] backed by the Claude Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeFeedback {
    client: Claude,
    max_tokens: usize,
}

impl ClaudeFeedback {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            max_tokens: 2048,
        }
    }

    /// Use `ANTHROPIC_API_KEY` from the environment.
    pub fn from_env() -> Result<Self, claude::Error> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client = self.client.with_model(model);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &str {
        self.client.model()
    }

    async fn generate(&self, prompt: String, failure: &str) -> Result<String, FeedbackError> {
        let request = Request::new(vec![Message::user(prompt)]).with_max_tokens(self.max_tokens);

        match self.client.complete(request).await {
            Ok(response) => {
                tracing::debug!(
                    model = %response.model,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Generation complete"
                );
                Ok(response.text)
            }
            Err(e) => {
                tracing::error!(error = %e, "Generation request failed");
                Err(FeedbackError::server(failure))
            }
        }
    }
}

#[async_trait]
impl FeedbackService for ClaudeFeedback {
    async fn feedback(&self, request: FeedbackRequest) -> Result<FeedbackResponse, FeedbackError> {
        request.validate()?;
        let feedback = self
            .generate(feedback_prompt(&request), FEEDBACK_FAILED)
            .await?;
        Ok(FeedbackResponse { feedback })
    }

    async fn grammar(&self, request: GrammarRequest) -> Result<GrammarResponse, FeedbackError> {
        request.validate()?;
        let suggestions = self
            .generate(grammar_prompt(&request), GRAMMAR_FAILED)
            .await?;
        Ok(GrammarResponse { suggestions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_wire_names() {
        let request: FeedbackRequest = serde_json::from_value(serde_json::json!({
            "sceneContent": "<p>문이 열렸다</p>",
            "characters": ["서윤"]
        }))
        .unwrap();

        assert_eq!(request.scene_content, "<p>문이 열렸다</p>");
        assert_eq!(request.synopsis, "");
        assert_eq!(request.characters, vec!["서윤"]);
    }

    #[test]
    fn test_error_body_has_only_error_field() {
        let json = serde_json::to_value(FeedbackError::client(MISSING_CONTENT)).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "내용이 필요합니다." }));
    }

    #[test]
    fn test_empty_content_is_client_error() {
        let err = FeedbackRequest::default().validate().unwrap_err();
        assert_eq!(err.status, FeedbackStatus::ClientError);
        assert_eq!(err.status.code(), 400);

        let err = GrammarRequest::default().validate().unwrap_err();
        assert_eq!(err.error, MISSING_CONTENT);
    }

    #[test]
    fn test_feedback_prompt_strips_tags_and_joins_characters() {
        let prompt = feedback_prompt(&FeedbackRequest {
            scene_content: "<p>안녕<br/>하세요</p>".to_string(),
            synopsis: "시놉".to_string(),
            characters: vec!["서윤".to_string(), "민호".to_string()],
        });

        assert!(prompt.contains("안녕하세요"));
        assert!(!prompt.contains("<p>"));
        assert!(prompt.contains("서윤, 민호"));

        let bare = feedback_prompt(&FeedbackRequest {
            scene_content: "x".to_string(),
            ..FeedbackRequest::default()
        });
        assert!(bare.contains(NO_CHARACTERS));
    }

    #[tokio::test]
    async fn test_claude_unreachable_is_server_error() {
        let service =
            ClaudeFeedback::new(Claude::new("test-key").with_base_url("http://127.0.0.1:9"));
        let err = service
            .grammar(GrammarRequest {
                content: "맞춤법".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.status, FeedbackStatus::ServerError);
        assert_eq!(err.error, GRAMMAR_FAILED);
    }

    #[test]
    fn test_model_override() {
        let service = ClaudeFeedback::new(Claude::new("test-key")).with_model("claude-test");
        assert_eq!(service.model(), "claude-test");
    }
}
