//! Deterministic offline content generators.
//!
//! Used whenever the generation service is disabled, unhealthy or failing.
//! Every function here is pure: the same inputs always give the same output
//! and nothing touches the network.

use reqwest::Url;

use crate::model::{
    Chapter, CourseOutline, EducationStage, Language, LectureContent, ResourceItem, ResourceSet,
};

/// Smallest hour allocation a chapter gets after rescaling.
pub const MIN_CHAPTER_HOURS: u32 = 2;

const BILIBILI_SEARCH: &str = "https://search.bilibili.com/all";
const BAIDU_SEARCH: &str = "https://www.baidu.com/s";

// ============================================================================
// Topic classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutlineTopic {
    Finance,
    ArtificialIntelligence,
    General,
}

impl OutlineTopic {
    fn classify(course_name: &str) -> Self {
        let name = course_name.to_lowercase();
        if contains_any(&name, &["数字", "经济", "金融", "econom", "financ", "digital"]) {
            Self::Finance
        } else if contains_any(
            &name,
            &[
                "人工",
                "智能",
                "机器学习",
                "深度学习",
                "artificial",
                "intelligence",
                "machine learning",
                "deep learning",
            ],
        ) || name.split(|c: char| !c.is_alphanumeric()).any(|w| w == "ai")
        {
            Self::ArtificialIntelligence
        } else {
            Self::General
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceTopic {
    Finance,
    Programming,
    General,
}

impl ResourceTopic {
    fn classify(course_name: &str) -> Self {
        let name = course_name.to_lowercase();
        if contains_any(
            &name,
            &["金融", "经济", "货币", "银行", "投资", "econom", "financ", "bank", "invest"],
        ) {
            Self::Finance
        } else if contains_any(&name, &["python", "编程", "计算机", "programming", "computer"]) {
            Self::Programming
        } else {
            Self::General
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// How content is pitched at each stage.
struct StageDescriptor {
    depth: &'static str,
    complexity: &'static str,
    examples: &'static str,
    language: &'static str,
}

const fn stage_descriptor(stage: EducationStage) -> StageDescriptor {
    match stage {
        EducationStage::Primary => StageDescriptor {
            depth: "基础",
            complexity: "简单",
            examples: "生活化",
            language: "通俗有趣",
        },
        EducationStage::Middle => StageDescriptor {
            depth: "中等",
            complexity: "适中",
            examples: "贴近生活",
            language: "严谨易懂",
        },
        EducationStage::High => StageDescriptor {
            depth: "深入",
            complexity: "复杂",
            examples: "学术化",
            language: "规范严谨",
        },
        EducationStage::University => StageDescriptor {
            depth: "专业",
            complexity: "高深",
            examples: "前沿性",
            language: "学术专业",
        },
    }
}

const fn stage_tone(stage: EducationStage, language: Language) -> &'static str {
    match (language, stage) {
        (Language::Chinese, EducationStage::Primary) => "使用生动有趣的语言，多举生活中的例子，强调兴趣培养",
        (Language::Chinese, EducationStage::Middle) => "注重知识系统性，使用图表归纳，语言严谨易懂",
        (Language::Chinese, EducationStage::High) => "内容深入系统，强调逻辑思维，使用规范学术语言",
        (Language::Chinese, EducationStage::University) => "内容专业前沿，强调独立思考，使用学术化表达",
        (Language::English, EducationStage::Primary) => {
            "Lively, playful language with everyday examples that build curiosity"
        }
        (Language::English, EducationStage::Middle) => {
            "Systematic coverage with diagrams and summaries, precise but approachable language"
        }
        (Language::English, EducationStage::High) => {
            "In-depth, structured treatment that trains logical thinking in formal academic language"
        }
        (Language::English, EducationStage::University) => {
            "Specialised, current material that encourages independent thinking in scholarly language"
        }
    }
}

// ============================================================================
// Outline
// ============================================================================

/// Builds a five-chapter outline from a keyword-selected topic template.
///
/// Template hours are `max(minimum, hours / divisor)` per chapter. When they
/// do not add up to `hours`, every chapter is scaled by `hours / sum`,
/// rounded, and floored at [`MIN_CHAPTER_HOURS`], so the total matches within
/// one hour per chapter.
#[must_use]
pub fn synthesize_outline(
    course_name: &str,
    objectives: &str,
    hours: u32,
    stage: EducationStage,
    policy_text: &str,
) -> CourseOutline {
    let topic = OutlineTopic::classify(course_name);
    tracing::info!(course = course_name, ?topic, "Synthesizing course outline");

    let d = stage_descriptor(stage);
    let label = stage.label_zh();
    let note = if policy_text.trim().is_empty() {
        ""
    } else {
        "\n\n政策要求说明：本课程大纲已严格遵循相关政策要求进行设计。"
    };

    // (name, minimum hours, divisor, key points)
    let template: [(String, u32, u32, String); 5] = match topic {
        OutlineTopic::Finance => [
            (format!("数字经济概述（{label}版）"), 4, 8, format!("数字经济定义、特征、发展历程 - {}讲解", d.depth)),
            (format!("数字技术基础（{label}版）"), 6, 6, format!("人工智能、大数据、区块链技术原理 - {}介绍", d.complexity)),
            (format!("数字商业模式（{label}版）"), 8, 4, format!("平台经济、共享经济、订阅经济模式 - {}案例", d.examples)),
            (format!("数据要素市场（{label}版）"), 6, 6, format!("数据确权、交易、定价机制 - {}说明", d.language)),
            (format!("数字治理政策（{label}版）"), 8, 4, format!("数字监管、隐私保护、国际合作 - {}分析", d.depth)),
        ],
        OutlineTopic::ArtificialIntelligence => [
            (format!("人工智能导论（{label}版）"), 4, 8, format!("AI发展历史、基本概念、应用领域 - {}介绍", d.depth)),
            (format!("机器学习基础（{label}版）"), 8, 4, format!("监督学习、无监督学习、强化学习 - {}讲解", d.complexity)),
            (format!("深度学习原理（{label}版）"), 10, 3, format!("神经网络、CNN、RNN、Transformer - {}原理", d.depth)),
            (format!("AI应用实践（{label}版）"), 8, 4, format!("计算机视觉、自然语言处理、推荐系统 - {}应用", d.examples)),
            (format!("AI伦理与社会（{label}版）"), 4, 8, format!("AI伦理、偏见、社会责任 - {}讨论", d.language)),
        ],
        OutlineTopic::General => [
            (format!("{course_name}导论（{label}版）"), 4, 8, format!("基本概念和理论基础 - {}介绍", d.depth)),
            (format!("{course_name}核心原理（{label}版）"), 8, 4, format!("主要理论和方法论 - {}讲解", d.complexity)),
            (format!("{course_name}应用实践（{label}版）"), 8, 4, format!("实际应用和案例分析 - {}实践", d.examples)),
            (format!("{course_name}前沿发展（{label}版）"), 6, 6, format!("最新发展趋势和挑战 - {}展望", d.depth)),
            (format!("{course_name}总结展望（{label}版）"), 4, 8, format!("课程总结和未来展望 - {}总结", d.language)),
        ],
    };

    let mut chapters: Vec<Chapter> = template
        .into_iter()
        .map(|(name, min_hours, divisor, points)| {
            Chapter::new(name, min_hours.max(hours / divisor), format!("{points}{note}"))
        })
        .collect();

    rescale_hours(&mut chapters, hours);

    CourseOutline {
        course_name: course_name.to_string(),
        education_stage: stage,
        objectives: objectives.to_string(),
        total_hours: hours,
        chapters,
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn rescale_hours(chapters: &mut [Chapter], hours: u32) {
    let sum: u32 = chapters.iter().map(|c| c.hours).sum();
    if sum == 0 || sum == hours {
        return;
    }
    let scale = f64::from(hours) / f64::from(sum);
    for chapter in chapters {
        let scaled = (f64::from(chapter.hours) * scale).round() as u32;
        chapter.hours = scaled.max(MIN_CHAPTER_HOURS);
    }
}

// ============================================================================
// Lecture
// ============================================================================

/// First item of a key-points list such as "定义、特征、历程".
fn lead_point(key_points: &str) -> &str {
    key_points
        .split(['、', ',', '，', ';', '；'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(key_points)
}

/// Builds lecture Markdown from a fixed template.
///
/// The template restates the key points, describes the stage tone, works two
/// example questions and closes with a summary and study advice.
#[must_use]
pub fn synthesize_lecture(
    chapter_name: &str,
    key_points: &str,
    hours: u32,
    stage: EducationStage,
    language: Language,
    policy_text: &str,
) -> LectureContent {
    tracing::info!(chapter = chapter_name, %language, "Synthesizing lecture");
    let lead = lead_point(key_points);
    let tone = stage_tone(stage, language);
    let has_policy = !policy_text.trim().is_empty();

    let text = match language {
        Language::Chinese => {
            let policy = if has_policy {
                "\n**政策要求说明：** 本讲义已严格遵循相关政策要求进行编写。\n"
            } else {
                ""
            };
            format!(
                "# {chapter_name}（{stage_label}版）\n\
                 \n\
                 **建议学时：** {hours}\n\
                 \n\
                 ## 第一部分：核心概念\n\
                 \n\
                 ### 知识点摘要\n\
                 \n\
                 {key_points}\n\
                 \n\
                 **教育阶段特点：** {tone}\n\
                 \n\
                 ### 例题\n\
                 \n\
                 1. **题目：** 请解释本章核心概念的含义及其重要性。\n   \
                 **解析：** 本章核心概念是{lead}，它是理解后续内容的基础，具有重要的理论和实践意义。\n\
                 \n\
                 2. **题目：** 请结合实例说明本章知识在实际中的应用。\n   \
                 **解析：** 以具体案例说明{lead}在实际场景中的应用方法和效果。\n\
                 {policy}\n\
                 ## 总结与建议\n\
                 \n\
                 ### 学习要点总结\n\
                 - 掌握{key_points}的基本概念\n\
                 - 理解相关理论和应用方法\n\
                 - 能够运用知识解决实际问题\n\
                 \n\
                 ### 学习建议\n\
                 - 注重理论与实践相结合\n\
                 - 多做练习巩固知识点\n\
                 - 积极参与课堂讨论和实践活动\n",
                stage_label = stage.label_zh(),
            )
        }
        Language::English => {
            let policy = if has_policy {
                "\n**Policy note:** This lecture follows the supplied policy requirements.\n"
            } else {
                ""
            };
            format!(
                "# {chapter_name} ({stage_label} Version)\n\
                 \n\
                 **Suggested hours:** {hours}\n\
                 \n\
                 ## Part 1: Core Concepts\n\
                 \n\
                 ### Key Points Summary\n\
                 \n\
                 {key_points}\n\
                 \n\
                 **Educational Stage Characteristics:** {tone}\n\
                 \n\
                 ### Example Questions\n\
                 \n\
                 1. **Question:** Explain the meaning and importance of the core concepts in this chapter.\n   \
                 **Answer:** The core concept of this chapter is {lead}, which underpins the rest of the course and matters in both theory and practice.\n\
                 \n\
                 2. **Question:** Give a real example of this chapter's knowledge in practice.\n   \
                 **Answer:** A concrete case shows how {lead} is applied in real scenarios and what it achieves.\n\
                 {policy}\n\
                 ## Summary and Recommendations\n\
                 \n\
                 ### Learning Key Points Summary\n\
                 - Master the basic concepts of {key_points}\n\
                 - Understand related theories and application methods\n\
                 - Be able to use knowledge to solve practical problems\n\
                 \n\
                 ### Learning Recommendations\n\
                 - Combine theory with practice\n\
                 - Do more exercises to consolidate knowledge points\n\
                 - Take an active part in class discussions and practice\n",
                stage_label = stage.label_en(),
            )
        }
    };

    LectureContent::new(text)
}

/// Applies a revision request offline by appending a feedback section.
#[must_use]
pub fn synthesize_update(current: &LectureContent, request: &str, language: Language) -> LectureContent {
    let section = match language {
        Language::Chinese => format!(
            "\n\n---\n\n## 根据用户反馈更新\n\n**用户要求：** {request}\n\n**更新说明：** 已根据用户反馈对讲义内容进行相应调整和优化。\n"
        ),
        Language::English => format!(
            "\n\n---\n\n## Revised per Feedback\n\n**Request:** {request}\n\n**Revision note:** The lecture has been adjusted to reflect this feedback.\n"
        ),
    };
    LectureContent::new(format!("{}{section}", current.as_str().trim_end()))
}

// ============================================================================
// Resources
// ============================================================================

/// Builds a search URL with the query percent-encoded.
fn search_url(base: &str, param: &str, query: &str) -> String {
    Url::parse_with_params(base, &[(param, query)])
        .map_or_else(|_| base.to_string(), String::from)
}

fn textbook(title: &str, author: &str, publisher: &str, note: &str) -> ResourceItem {
    ResourceItem::fields([
        ("书名", title.to_string()),
        ("作者", author.to_string()),
        ("出版社", publisher.to_string()),
        ("备注", note.to_string()),
    ])
}

fn video(title: &str, platform: &str, link: String) -> ResourceItem {
    ResourceItem::fields([
        ("视频标题", title.to_string()),
        ("发布平台", platform.to_string()),
        ("主讲人/机构", "多个来源".to_string()),
        ("链接", link),
    ])
}

fn tool(name: &str, kind: &str, purpose: &str) -> ResourceItem {
    ResourceItem::fields([
        ("工具名称", name.to_string()),
        ("类型", kind.to_string()),
        ("用途", purpose.to_string()),
    ])
}

fn case_study(name: &str, field: &str, description: &str) -> ResourceItem {
    ResourceItem::fields([
        ("案例名称", name.to_string()),
        ("领域", field.to_string()),
        ("描述", description.to_string()),
    ])
}

/// Returns placeholder resources for a course.
///
/// Video links are search-engine queries built from the course name, not
/// resolved results. Every category has at least one item.
#[must_use]
pub fn synthesize_resources(course_name: &str, stage: EducationStage) -> ResourceSet {
    let topic = ResourceTopic::classify(course_name);
    tracing::info!(course = course_name, ?topic, "Synthesizing teaching resources");
    let bili = |suffix: &str| search_url(BILIBILI_SEARCH, "keyword", &format!("{course_name} {suffix}"));
    let baidu = |suffix: &str| search_url(BAIDU_SEARCH, "wd", &format!("{course_name} {suffix}"));
    let audience = format!("适用于{}阶段", stage.label_zh());

    match topic {
        ResourceTopic::Finance => ResourceSet {
            textbooks: vec![
                textbook("金融学原理", "李健", "高等教育出版社", &format!("系统讲解金融学基础理论，{audience}")),
                textbook("货币银行学", "黄达", "中国人民大学出版社", "经典货币银行学教材"),
            ],
            videos: vec![
                video("金融学原理相关视频", "B站搜索", bili("金融学 视频")),
                video("经济学教学视频", "百度搜索", baidu("经济学 教学视频")),
            ],
            tools: vec![tool("Wind金融终端", "专业金融数据平台", "金融市场数据分析")],
            case_studies: vec![case_study("2008年金融危机分析", "金融风险", "分析金融危机成因和应对措施")],
        },
        ResourceTopic::Programming => ResourceSet {
            textbooks: vec![textbook(
                "Python编程：从入门到实践",
                "Eric Matthes",
                "人民邮电出版社",
                &format!("适合初学者的Python教材，{audience}"),
            )],
            videos: vec![
                video("Python编程教学视频", "B站搜索", bili("Python 编程 教程")),
                video("计算机科学教学资源", "百度搜索", baidu("计算机 教学视频")),
            ],
            tools: vec![tool("PyCharm", "IDE", "Python开发环境")],
            case_studies: vec![case_study("Python数据分析实战", "数据分析", "使用Python进行数据分析和可视化")],
        },
        ResourceTopic::General => ResourceSet {
            textbooks: vec![textbook(
                &format!("{course_name}导论"),
                "多位专家",
                "高等教育出版社",
                &format!("{course_name}领域入门教材，{audience}"),
            )],
            videos: vec![
                video(&format!("{course_name}教学视频"), "B站搜索", bili("教学视频")),
                video(&format!("{course_name}学习资源"), "百度搜索", baidu("学习 视频")),
            ],
            tools: vec![tool("相关专业软件", "专业工具", &format!("{course_name}领域专业应用"))],
            case_studies: vec![case_study(
                &format!("{course_name}应用案例"),
                "实践应用",
                &format!("{course_name}在实际中的应用分析"),
            )],
        },
    }
}
