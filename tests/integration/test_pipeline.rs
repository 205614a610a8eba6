//! End-to-end tests of the generation pipeline over HTTP.
//!
//! These drive the orchestrator through a real `HttpTransport` against the
//! scripted mock service, then export the results.

mod common;

use std::time::Duration;

use common::{spawn_mock_server, test_settings, MockReply};
use coursecraft_engine::synth::{synthesize_outline, synthesize_resources};
use coursecraft_engine::{
    ApiHealth, ConversationTurn, EducationStage, FallbackReason, GenerationFailure, HttpTransport,
    Language, LectureContent, LectureRequest, Orchestrator, OutlineRequest, ResourceItem,
    RetryPolicy, Role, TransportError, UpdateRequest,
};
use coursecraft_export::{CoursePackage, MarkdownExporter};

fn orchestrator(url: &str) -> Orchestrator<HttpTransport> {
    let mut settings = test_settings(url);
    settings.max_retries = 0;
    let transport = HttpTransport::new(settings).expect("valid settings");
    Orchestrator::new(transport).with_policy(RetryPolicy {
        retry_delay: Duration::ZERO,
        ..RetryPolicy::default()
    })
}

fn outline_request() -> OutlineRequest {
    OutlineRequest {
        course_name: "数字经济".to_string(),
        objectives: "理解数字经济的基本概念".to_string(),
        total_hours: 8,
        stage: EducationStage::Middle,
        policy_text: String::new(),
    }
}

const FENCED_OUTLINE: &str = r#"好的，以下是课程大纲：

```json
{
  "课程名称": "数字经济",
  "教育阶段": "大学",
  "章节列表": [
    {"章节名称": "数字经济概述", "学时": "4学时", "重点内容": "概念、特征"},
    {"章节名称": "平台经济", "学时": 4, "重点内容": "网络效应"}
  ]
}
```

希望对您有帮助！"#;

// ============================================================================
// Remote path
// ============================================================================

/// Tests that a fenced outline reply is parsed and completed from the request.
#[tokio::test]
async fn test_outline_from_fenced_reply() {
    let (url, server) = spawn_mock_server(vec![MockReply::completion(FENCED_OUTLINE)]).await;
    let orchestrator = orchestrator(&url);
    let mut health = ApiHealth::new();

    let generated = orchestrator.get_outline(&mut health, &outline_request()).await;

    assert!(generated.is_remote(), "expected remote outline: {:?}", generated.source);
    let outline = generated.artifact;
    assert_eq!(outline.course_name, "数字经济");
    // The requested stage wins over the model's.
    assert_eq!(outline.education_stage, EducationStage::Middle);
    assert_eq!(outline.total_hours, 8);
    assert_eq!(outline.chapters.len(), 2);
    assert_eq!(outline.chapters[0].hours, 4);
    assert_eq!(outline.hours_allocated(), 8);
    assert_eq!(health.consecutive_error_count, 0);
    assert!(health.last_success_time.is_some());
    assert_eq!(server.request_count(), 1);
}

/// Tests that mixed-shape resources are normalized and gaps back-filled.
#[tokio::test]
async fn test_resources_normalized_and_backfilled() {
    let reply = r#"{
        "教材": [{"书名": "数字经济学", "作者": "张三"}],
        "在线视频": "[\"数字经济公开课\"]",
        "工具/软件": null
    }"#;
    let (url, _server) = spawn_mock_server(vec![MockReply::completion(reply)]).await;
    let orchestrator = orchestrator(&url);
    let mut health = ApiHealth::new();

    let generated = orchestrator
        .get_resources(&mut health, "数字经济", EducationStage::Middle)
        .await;

    assert!(generated.is_remote());
    let resources = generated.artifact;
    let expected = synthesize_resources("数字经济", EducationStage::Middle);

    assert_eq!(resources.textbooks.len(), 1);
    assert_eq!(resources.textbooks[0].title().as_deref(), Some("数字经济学"));
    assert_eq!(
        resources.videos,
        vec![ResourceItem::Text("数字经济公开课".to_string())]
    );
    assert_eq!(resources.tools, expected.tools);
    assert_eq!(resources.case_studies, expected.case_studies);
}

/// Tests that a garbled reply is retried and the next good one used.
#[tokio::test]
async fn test_unparseable_reply_is_retried() {
    let (url, server) = spawn_mock_server(vec![
        MockReply::completion("抱歉，我无法生成大纲。"),
        MockReply::completion(FENCED_OUTLINE),
    ])
    .await;
    let orchestrator = orchestrator(&url);
    let mut health = ApiHealth::new();

    let generated = orchestrator.get_outline(&mut health, &outline_request()).await;

    assert!(generated.is_remote());
    assert_eq!(server.request_count(), 2);
    assert_eq!(health.consecutive_error_count, 0);
}

/// Tests a lecture followed by a revision that records the conversation.
#[tokio::test]
async fn test_lecture_and_update_round() {
    let (url, server) = spawn_mock_server(vec![
        MockReply::completion("# 平台经济\n\n## 教学目标\n\n理解网络效应。"),
        MockReply::completion(
            "```markdown\n# 平台经济\n\n## 教学目标\n\n理解网络效应。\n\n## 案例\n\n外卖平台。\n```",
        ),
    ])
    .await;
    let orchestrator = orchestrator(&url);
    let mut health = ApiHealth::new();

    let chapter = coursecraft_engine::Chapter::new("平台经济", 4, "网络效应");
    let request = LectureRequest::for_chapter(&chapter, EducationStage::Middle, Language::Chinese, "");
    let lecture = orchestrator.get_lecture(&mut health, &request).await;
    assert!(lecture.is_remote());

    let update = UpdateRequest {
        current: lecture.artifact.clone(),
        request: "增加一个案例".to_string(),
        stage: EducationStage::Middle,
        language: Language::Chinese,
        policy_text: String::new(),
    };
    let mut history: Vec<ConversationTurn> = Vec::new();
    let revised = orchestrator
        .update_lecture(&mut health, &update, &mut history)
        .await;

    assert!(revised.is_remote());
    assert!(revised.artifact.as_str().starts_with("# 平台经济"));
    assert!(revised.artifact.as_str().contains("外卖平台"));
    assert!(!revised.artifact.as_str().contains("```"));

    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].message, "增加一个案例");
    assert_eq!(history[1].role, Role::Assistant);

    let prompt = server.requests()[1]["messages"][0]["content"]
        .as_str()
        .expect("prompt is a string")
        .to_string();
    assert!(prompt.contains("增加一个案例"));
    assert!(prompt.contains("理解网络效应"));

    // The revised lecture exports as part of a course.
    let outline = synthesize_outline("数字经济", "理解数字经济的基本概念", 8, EducationStage::Middle, "");
    let package = CoursePackage::new(outline, synthesize_resources("数字经济", EducationStage::Middle))
        .with_lecture(chapter, revised.artifact);
    let markdown = MarkdownExporter::new(&package).generate();
    assert!(markdown.contains("外卖平台"));
}

// ============================================================================
// Fallback path
// ============================================================================

/// Tests that persistent failures fall back, then trip the health check.
#[tokio::test]
async fn test_failures_fall_back_then_skip_service() {
    let (url, server) = spawn_mock_server(vec![]).await;
    let orchestrator = orchestrator(&url);
    let mut health = ApiHealth::new();

    // Three failed attempts, then synthesized content.
    let outline = orchestrator.get_outline(&mut health, &outline_request()).await;
    assert!(!outline.is_remote());
    assert!(matches!(
        outline.failure(),
        Some(GenerationFailure::Transport(TransportError::HttpError { status: 500, .. }))
    ));
    assert_eq!(outline.artifact.total_hours, 8);
    assert_eq!(outline.artifact.chapters.len(), 5);
    assert_eq!(health.consecutive_error_count, 3);
    assert_eq!(server.request_count(), 3);

    // Already past the fallback threshold: one attempt only.
    let resources = orchestrator
        .get_resources(&mut health, "数字经济", EducationStage::Middle)
        .await;
    assert!(!resources.is_remote());
    assert_eq!(health.consecutive_error_count, 4);
    assert_eq!(server.request_count(), 4);

    // Past the skip threshold: the service is not called.
    let chapter = &outline.artifact.chapters[0];
    let request = LectureRequest::for_chapter(chapter, EducationStage::Middle, Language::Chinese, "");
    let lecture = orchestrator.get_lecture(&mut health, &request).await;
    assert!(matches!(
        lecture.fallback_reason(),
        Some(FallbackReason::HealthTripped {
            consecutive_errors: 4
        })
    ));
    assert!(!lecture.artifact.is_blank());
    assert_eq!(server.request_count(), 4);
}

/// Tests that an offline update still records one reply in the conversation.
#[tokio::test]
async fn test_offline_update_records_notice() {
    let (url, server) = spawn_mock_server(vec![]).await;
    let orchestrator = orchestrator(&url).with_prefer_local(true);
    let mut health = ApiHealth::new();

    let update = UpdateRequest {
        current: LectureContent::new("# Markets\n\nSupply and demand."),
        request: "add an example".to_string(),
        stage: EducationStage::High,
        language: Language::English,
        policy_text: String::new(),
    };
    let mut history = Vec::new();
    let revised = orchestrator
        .update_lecture(&mut health, &update, &mut history)
        .await;

    assert!(matches!(revised.fallback_reason(), Some(FallbackReason::PreferLocal)));
    assert!(revised.artifact.as_str().starts_with("# Markets"));
    assert!(revised.artifact.as_str().contains("add an example"));
    assert_eq!(history.len(), 2);
    assert_eq!(server.request_count(), 0);
}
