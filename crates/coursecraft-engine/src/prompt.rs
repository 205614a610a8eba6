//! Prompt text sent to the generation service.
//!
//! Structured artifacts ask for JSON using the Chinese keys accepted by
//! [`crate::model`]; lectures ask for plain Markdown.

use std::fmt::Write;

use crate::model::{ConversationTurn, EducationStage, ResourceCategory};
use crate::orchestrator::{LectureRequest, OutlineRequest, UpdateRequest};

/// Turns of conversation history included in an update prompt.
const HISTORY_WINDOW: usize = 10;

fn stage_guidance(stage: EducationStage) -> &'static str {
    match stage {
        EducationStage::Primary => {
            "面向小学生：语言浅显有趣，多用生活中的例子和图示，单次讲解内容不宜过多。"
        }
        EducationStage::Middle => {
            "面向初中生：知识点系统清晰，适当引入概念推导，配合图表归纳与练习。"
        }
        EducationStage::High => {
            "面向高中生：内容深入严谨，强调逻辑推理与综合应用，可结合考试要求。"
        }
        EducationStage::University => {
            "面向大学生：内容专业前沿，鼓励批判性思考，引用学术文献与研究案例。"
        }
    }
}

fn policy_section(policy_text: &str) -> String {
    if policy_text.trim().is_empty() {
        String::new()
    } else {
        format!("\n必须遵循的政策要求：\n{}\n", policy_text.trim())
    }
}

/// Prompt asking for a course outline as JSON.
#[must_use]
pub fn outline_prompt(request: &OutlineRequest) -> String {
    format!(
        "你是一名经验丰富的{stage}课程设计专家。请为以下课程设计教学大纲。\n\
         \n\
         课程名称：{name}\n\
         教学目标：{objectives}\n\
         总学时：{hours}\n\
         {guidance}\n\
         {policy}\n\
         请只返回一个JSON对象，不要包含其他说明文字，格式如下：\n\
         {{\"课程名称\": \"...\", \"教育阶段\": \"{stage}\", \"教学目标\": \"...\", \"总学时\": {hours}, \
         \"章节列表\": [{{\"章节名称\": \"...\", \"学时\": 4, \"重点内容\": \"...\"}}]}}\n\
         各章节学时之和应等于总学时。\n",
        stage = request.stage.label_zh(),
        name = request.course_name,
        objectives = request.objectives,
        hours = request.total_hours,
        guidance = stage_guidance(request.stage),
        policy = policy_section(&request.policy_text),
    )
}

/// Prompt asking for one chapter's lecture as Markdown.
#[must_use]
pub fn lecture_prompt(request: &LectureRequest) -> String {
    format!(
        "请为{stage}阶段的课程章节编写完整讲义。\n\
         \n\
         章节名称：{chapter}\n\
         重点内容：{points}\n\
         学时：{hours}\n\
         {guidance}\n\
         {policy}\n\
         讲义使用Markdown格式，包含知识讲解、至少两道例题及解析、课堂活动和小结。\n\
         输出语言：{language}\n",
        stage = request.stage.label_zh(),
        chapter = request.chapter_name,
        points = request.key_points,
        hours = request.hours,
        guidance = stage_guidance(request.stage),
        policy = policy_section(&request.policy_text),
        language = request.language.prompt_name(),
    )
}

/// Prompt asking for teaching resources as JSON.
#[must_use]
pub fn resources_prompt(course_name: &str, stage: EducationStage) -> String {
    let keys = ResourceCategory::ALL
        .iter()
        .map(|c| format!("\"{}\": [...]", c.key_zh()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "请为{stage}阶段的课程《{course_name}》推荐教学资源。\n\
         {guidance}\n\
         \n\
         只返回一个JSON对象，包含以下四个键，每个键的值是资源列表：\n\
         {{{keys}}}\n\
         教材请给出书名、作者、出版社和备注；在线视频请给出视频标题、发布平台、主讲人/机构和链接；\
         工具/软件请给出工具名称、类型和用途；案例研究请给出案例名称、领域和描述。\n",
        stage = stage.label_zh(),
        guidance = stage_guidance(stage),
    )
}

/// Prompt asking for a revised lecture given the conversation so far.
#[must_use]
pub fn update_prompt(request: &UpdateRequest, history: &[ConversationTurn]) -> String {
    let mut transcript = String::new();
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    for turn in &history[start..] {
        let _ = writeln!(transcript, "{}: {}", turn.role, turn.message);
    }

    format!(
        "你正在协助一位{stage}教师修改讲义。\n\
         {guidance}\n\
         {policy}\n\
         当前讲义：\n\
         ----\n\
         {current}\n\
         ----\n\
         \n\
         对话记录：\n\
         {transcript}\n\
         最新修改要求：{ask}\n\
         \n\
         请根据要求输出修改后的完整讲义（Markdown格式），不要附加解释。输出语言：{language}\n",
        stage = request.stage.label_zh(),
        guidance = stage_guidance(request.stage),
        policy = policy_section(&request.policy_text),
        current = request.current.as_str(),
        ask = request.request,
        language = request.language.prompt_name(),
    )
}
