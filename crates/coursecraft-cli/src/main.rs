//! Coursecraft CLI
//!
//! Main entry point for generating course outlines, lectures and teaching
//! resources, refining lectures, and exporting finished courses.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use coursecraft_engine::diff::changed_count;
use coursecraft_engine::policy::{extract_key_requirements, DEFAULT_MAX_CHARS};
use coursecraft_engine::{
    mark_changes, ArtifactSource, Chapter, Config, CourseSession, EducationStage, Generated,
    HttpTransport, Language, LectureRequest, Orchestrator, OutlineRequest, Role, UpdateRequest,
};
use coursecraft_export::json::JsonExporter;
use coursecraft_export::slides::SlideDeck;
use coursecraft_export::survey::{SurveyStore, SurveySummary, DEFAULT_SURVEY_FILE, MULTI_CHOICE};
use coursecraft_export::{file_stem_for, CoursePackage, MarkdownExporter};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

/// Default teaching hours for a new course.
const DEFAULT_HOURS: u32 = 32;

/// Coursecraft - AI Course Content Generator
///
/// Generates course outlines, lectures and teaching resources through a
/// chat-completions service, falling back to offline content when the
/// service is unavailable.
#[derive(Parser, Debug)]
#[command(name = "coursecraft")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: coursecraft.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Generate everything offline without calling the service
    #[arg(long, global = true)]
    offline: bool,

    /// API key for the generation service
    #[arg(long, env = "COURSECRAFT_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new course: generate its outline and teaching resources
    Outline {
        /// Course name
        course_name: String,

        /// Teaching objectives
        #[arg(long, default_value = "")]
        objectives: String,

        /// Total teaching hours
        #[arg(long, default_value_t = DEFAULT_HOURS, value_parser = clap::value_parser!(u32).range(1..))]
        hours: u32,

        /// Education stage (primary, middle, high, university)
        #[arg(long, default_value = "primary")]
        stage: EducationStage,

        /// Plain-text policy document whose requirements the course must meet
        #[arg(long, value_name = "FILE")]
        policy: Option<PathBuf>,
    },

    /// Generate the lecture for a chapter
    Lecture {
        /// Chapter name as it appears in the outline
        chapter: String,

        /// Lecture language (chinese, english)
        #[arg(long)]
        language: Option<Language>,
    },

    /// Revise a chapter's lecture with a request
    Refine {
        /// Chapter name as it appears in the outline
        chapter: String,

        /// What to change
        request: String,

        /// Lecture language (chinese, english)
        #[arg(long)]
        language: Option<Language>,
    },

    /// Clear a chapter's refinement conversation
    Reset {
        /// Chapter name as it appears in the outline
        chapter: String,
    },

    /// Write the course as Markdown, JSON and slide decks
    Export {
        /// Output directory (overrides config)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<String>,
    },

    /// Show the current session and service settings
    Status,

    /// Record or summarize satisfaction surveys
    Survey {
        #[command(subcommand)]
        action: SurveyCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SurveyCommand {
    /// Record one survey submission
    Add {
        /// Answer as QUESTION=VALUE; repeat a multi-choice question for each option
        #[arg(short, long = "answer", value_name = "KEY=VALUE", value_parser = parse_answer, required = true)]
        answers: Vec<(String, String)>,

        /// Survey results file
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Print tallies of all submissions
    Summary {
        /// Survey results file
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, offline = args.offline, "CourseCraft starting");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Dispatches a subcommand.
async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(key) = args.api_key {
        config.api.api_key = Some(key);
    }
    if args.offline {
        config.generation.prefer_local = true;
    }
    config.validate()?;

    let session_path = PathBuf::from(&config.session_file);

    match args.command {
        Command::Outline {
            course_name,
            objectives,
            hours,
            stage,
            policy,
        } => {
            let policy_text = match policy {
                Some(path) => read_policy(&path)?,
                None => String::new(),
            };
            let request = OutlineRequest {
                course_name,
                objectives,
                total_hours: hours,
                stage,
                policy_text,
            };
            request.validate()?;
            run_outline(&config, &session_path, request).await
        }
        Command::Lecture { chapter, language } => {
            let language = language.unwrap_or(config.generation.language);
            run_lecture(&config, &session_path, &chapter, language).await
        }
        Command::Refine {
            chapter,
            request,
            language,
        } => {
            let language = language.unwrap_or(config.generation.language);
            run_refine(&config, &session_path, &chapter, request, language).await
        }
        Command::Reset { chapter } => run_reset(&session_path, &chapter).await,
        Command::Export { output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            run_export(&config, &session_path, Path::new(&output_dir)).await
        }
        Command::Status => run_status(&config, &session_path).await,
        Command::Survey { action } => run_survey(&config, action),
    }
}

// ============================================================================
// Course commands
// ============================================================================

/// Starts a new session with an outline and resources.
async fn run_outline(
    config: &Config,
    session_path: &Path,
    request: OutlineRequest,
) -> anyhow::Result<()> {
    if CourseSession::load(session_path).await?.is_some() {
        println!(
            "Replacing existing session at {}",
            session_path.display()
        );
    }

    let orchestrator = build_orchestrator(config)?;
    let mut session = CourseSession::new(request);

    println!(
        "Generating outline for '{}' ({}, {} hours)...",
        session.request.course_name,
        session.request.stage.label(config.generation.language),
        session.request.total_hours
    );
    let outline = orchestrator
        .get_outline(&mut session.health, &session.request)
        .await;
    report_source("Outline", &outline);

    println!("Recommending resources...");
    let resources = orchestrator
        .get_resources(
            &mut session.health,
            &session.request.course_name,
            session.request.stage,
        )
        .await;
    report_source("Resources", &resources);

    print_outline(&outline.artifact.chapters, outline.artifact.total_hours);
    if outline.artifact.hours_allocated() != outline.artifact.total_hours {
        println!(
            "Note: chapters allocate {} of {} requested hours",
            outline.artifact.hours_allocated(),
            outline.artifact.total_hours
        );
    }

    session.outline = Some(outline.artifact);
    session.resources = Some(resources.artifact);
    session.touch();
    session.save(session_path).await?;
    println!();
    println!("Session saved: {}", session_path.display());
    Ok(())
}

/// Generates and stores one chapter's lecture.
async fn run_lecture(
    config: &Config,
    session_path: &Path,
    chapter_name: &str,
    language: Language,
) -> anyhow::Result<()> {
    let mut session = load_session(session_path).await?;
    let chapter = session.chapter(chapter_name)?.clone();
    let orchestrator = build_orchestrator(config)?;

    println!("Generating lecture for '{}'...", chapter.name);
    let request = LectureRequest::for_chapter(
        &chapter,
        session.request.stage,
        language,
        session.request.policy_text.clone(),
    );
    let lecture = orchestrator.get_lecture(&mut session.health, &request).await;
    report_source("Lecture", &lecture);

    println!();
    println!("{}", lecture.artifact);

    session.set_lecture(&chapter, lecture.artifact);
    session.save(session_path).await?;
    Ok(())
}

/// Revises a chapter's lecture and prints the changed lines.
async fn run_refine(
    config: &Config,
    session_path: &Path,
    chapter_name: &str,
    request: String,
    language: Language,
) -> anyhow::Result<()> {
    let mut session = load_session(session_path).await?;
    let chapter = session.chapter(chapter_name)?.clone();
    let Some(current) = session.lecture(&chapter).cloned() else {
        anyhow::bail!(
            "No lecture for chapter '{}'\n\nSuggestion: Run `coursecraft lecture \"{}\"` first",
            chapter.name,
            chapter.name
        );
    };
    let orchestrator = build_orchestrator(config)?;

    let update = UpdateRequest {
        current,
        request,
        stage: session.request.stage,
        language,
        policy_text: session.request.policy_text.clone(),
    };

    let mut history = std::mem::take(session.history_mut(&chapter));
    let revised = orchestrator
        .update_lecture(&mut session.health, &update, &mut history)
        .await;
    report_source("Revision", &revised);

    let marked = mark_changes(update.current.as_str(), revised.artifact.as_str());
    println!();
    for line in &marked {
        let marker = if line.changed { "+ " } else { "  " };
        println!("{marker}{}", line.text);
    }
    println!();
    println!("{} line(s) changed", changed_count(&marked));

    if let Some(reply) = history.iter().rev().find(|t| t.role == Role::Assistant) {
        println!("{}", reply.message);
    }

    *session.history_mut(&chapter) = history;
    session.set_lecture(&chapter, revised.artifact);
    session.save(session_path).await?;
    Ok(())
}

/// Clears a chapter's conversation, keeping its lecture.
async fn run_reset(session_path: &Path, chapter_name: &str) -> anyhow::Result<()> {
    let mut session = load_session(session_path).await?;
    let chapter = session.chapter(chapter_name)?.clone();
    let turns = session.history(&chapter).len();

    session.reset_history(&chapter);
    session.save(session_path).await?;

    println!("Cleared {turns} turn(s) for '{}'", chapter.name);
    Ok(())
}

/// Writes the course document, JSON and one slide deck per lecture.
async fn run_export(config: &Config, session_path: &Path, output_dir: &Path) -> anyhow::Result<()> {
    let session = load_session(session_path).await?;
    let Some(outline) = session.outline.clone() else {
        anyhow::bail!(
            "Session has no outline\n\nSuggestion: Run `coursecraft outline <COURSE>` first"
        );
    };

    let language = config.generation.language;
    let lectures = outline
        .chapters
        .iter()
        .filter_map(|c| session.lecture(c).map(|l| (c.clone(), l.clone())))
        .collect::<Vec<_>>();
    let mut package = CoursePackage::new(outline, session.resources.clone().unwrap_or_default())
        .with_language(language);
    package.lectures = lectures;
    package.validate()?;

    std::fs::create_dir_all(output_dir).map_err(|e| {
        anyhow::anyhow!(
            "Failed to create output directory: {e}\n\nPath: {}",
            output_dir.display()
        )
    })?;

    println!("Exporting '{}'...", package.outline.course_name);
    let stem = file_stem_for(&package.outline.course_name);

    let md_path = output_dir.join(format!("{stem}.md"));
    std::fs::write(&md_path, MarkdownExporter::new(&package).generate())?;
    println!("  Markdown: {}", md_path.display());

    let json_path = output_dir.join(format!("{stem}.json"));
    JsonExporter::new(&package).write_to_file(&json_path, true)?;
    println!("  JSON: {}", json_path.display());

    for (chapter, lecture) in &package.lectures {
        let deck = SlideDeck::from_markdown(lecture.as_str(), language);
        let deck_path = output_dir.join(format!("{}.slides.md", file_stem_for(&chapter.name)));
        deck.write_marp(&deck_path)?;
        println!("  Slides ({}): {}", deck.len(), deck_path.display());
    }

    let missing = package.outline.chapters.len() - package.lectures.len();
    if missing > 0 {
        println!();
        println!("{missing} chapter(s) have no lecture yet");
    }
    Ok(())
}

/// Prints the session and service settings.
async fn run_status(config: &Config, session_path: &Path) -> anyhow::Result<()> {
    println!("Service:");
    println!("  URL: {}", config.api.api_url);
    println!("  Model: {}", config.api.model);
    println!(
        "  Credential: {}",
        if config.api.has_credential() { "configured" } else { "missing" }
    );
    println!("  Offline: {}", config.generation.prefer_local);
    println!(
        "  Attempts: {} (fallback after {} failures, skip after {})",
        config.generation.max_attempts,
        config.generation.fallback_threshold,
        config.generation.skip_threshold
    );

    println!();
    let Some(session) = CourseSession::load(session_path).await? else {
        println!("No session at {}", session_path.display());
        return Ok(());
    };

    println!("Session: {}", session_path.display());
    println!("  Course: {}", session.request.course_name);
    println!(
        "  Stage: {}",
        session.request.stage.label(config.generation.language)
    );
    println!("  Updated: {}", session.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(resources) = &session.resources {
        println!("  Resources: {}", resources.len());
    }

    match &session.outline {
        Some(outline) => {
            println!();
            println!("Chapters ({} of {} hours):", outline.hours_allocated(), outline.total_hours);
            for chapter in &outline.chapters {
                let lecture = if session.lecture(chapter).is_some() { "lecture" } else { "-" };
                println!(
                    "  {} ({}h) [{lecture}, {} turn(s)]",
                    chapter.name,
                    chapter.hours,
                    session.history(chapter).len()
                );
            }
        }
        None => println!("  No outline"),
    }
    Ok(())
}

// ============================================================================
// Survey commands
// ============================================================================

fn run_survey(config: &Config, action: SurveyCommand) -> anyhow::Result<()> {
    let default_path = Path::new(&config.output_dir).join(DEFAULT_SURVEY_FILE);

    match action {
        SurveyCommand::Add { answers, file } => {
            let store = SurveyStore::new(file.unwrap_or(default_path));
            let count = store.append(collect_answers(answers))?;
            println!(
                "Saved survey response to {} ({count} total)",
                store.path().display()
            );
        }
        SurveyCommand::Summary { file } => {
            let store = SurveyStore::new(file.unwrap_or(default_path));
            let records = store.load()?;
            print!("{}", SurveySummary::from_records(&records).to_markdown());
        }
    }
    Ok(())
}

/// Builds an answer map; multi-choice questions collect every value given.
fn collect_answers(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut answers = Map::new();
    for (key, value) in pairs {
        if MULTI_CHOICE.contains(&key.as_str()) {
            let entry = answers
                .entry(key)
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(options) = entry {
                options.push(Value::String(value));
            }
        } else if answers.insert(key.clone(), Value::String(value)).is_some() {
            tracing::warn!(question = %key, "Question answered more than once; keeping the last answer");
        }
    }
    answers
}

fn parse_answer(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid answer '{s}': expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid answer '{s}': question key is empty"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

// ============================================================================
// Helpers
// ============================================================================

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the session, failing if none has been started.
async fn load_session(session_path: &Path) -> anyhow::Result<CourseSession> {
    CourseSession::load(session_path).await?.ok_or_else(|| {
        anyhow::anyhow!(
            "No course session at '{}'\n\nSuggestion: Run `coursecraft outline <COURSE>` first",
            session_path.display()
        )
    })
}

/// Reads a policy document and keeps its requirement lines.
fn read_policy(path: &Path) -> anyhow::Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read policy file: {e}\n\nPath: {}\n\nSuggestion: Provide a plain-text file",
            path.display()
        )
    })?;
    let requirements = extract_key_requirements(&text, DEFAULT_MAX_CHARS);
    tracing::debug!(chars = requirements.chars().count(), "Extracted policy requirements");
    Ok(requirements)
}

fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator<HttpTransport>> {
    if !config.api.has_credential() && !config.generation.prefer_local {
        tracing::warn!("No API key configured; content will be generated offline");
    }
    let transport = HttpTransport::new(config.api.transport_settings())?;
    Ok(Orchestrator::new(transport)
        .with_policy(config.generation.retry_policy())
        .with_model(config.api.model.clone())
        .with_temperature(config.api.temperature)
        .with_prefer_local(config.generation.prefer_local))
}

/// Prints where an artifact came from and, after a failure, what to do.
fn report_source<A>(label: &str, generated: &Generated<A>) {
    match &generated.source {
        ArtifactSource::Remote => println!("{label}: generated by the service"),
        ArtifactSource::Synthesized { reason } => {
            println!("{label}: offline content ({reason})");
            if let Some(failure) = generated.failure() {
                println!("  Suggestion: {}", failure.kind().suggestion());
            }
        }
    }
    if let Some(raw) = generated.unparsed_output() {
        tracing::debug!(chars = raw.chars().count(), raw, "Unparsed service output");
    }
}

fn print_outline(chapters: &[Chapter], total_hours: u32) {
    println!();
    println!("Outline ({total_hours} hours):");
    for (index, chapter) in chapters.iter().enumerate() {
        println!("  {}. {} ({}h)", index + 1, chapter.name, chapter.hours);
        if !chapter.key_points.trim().is_empty() {
            println!("     {}", chapter.key_points.trim());
        }
    }
}
