use std::future::Future;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use story_config::{Config, ConfigError, LoadOptions};
use story_drafts::{draft_key, DraftStore, HistoryRecord, SqliteBackend};
use story_markdown::{parse, serialize_with, Content, RenderOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod fs;
pub mod story;

pub use story::{language_name, story_catalog, story_number, LANGUAGES};

/// Process exit codes reported by `obs-editor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    NotFound = 1,
    InvalidArguments = 3,
    Io = 4,
    InvalidContent = 5,
}

#[derive(Parser, Debug)]
#[command(name = "obs-editor", author, version, about = "Translate OBS stories frame by frame", long_about = None)]
struct Cli {
    /// Configuration file layered over the discovered `.obs-editor.toml` files
    #[arg(long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a Markdown story as a structured JSON document
    Parse(InputArgs),
    /// Print the Markdown form of a JSON document
    Render(InputArgs),
    /// Print an empty translation template for a Markdown story
    Template(InputArgs),
    /// Parse a Markdown story and store it as a draft
    Save(SaveArgs),
    /// Print a stored draft as JSON
    Show(DraftArgs),
    /// List stored drafts
    List(ListArgs),
    /// Delete every stored draft
    Clear,
    /// Write a stored draft to `<story>.md`
    Export(ExportArgs),
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Input file ('-' for stdin)
    #[arg(value_name = "FILE", allow_hyphen_values = true)]
    input: PathBuf,
}

#[derive(clap::Args, Debug)]
struct DraftArgs {
    /// Story identifier, e.g. 05
    #[arg(long = "story", value_name = "NUM")]
    story: String,

    /// Target language code (defaults to drafts.default_language)
    #[arg(long = "language", value_name = "CODE")]
    language: Option<String>,
}

#[derive(clap::Args, Debug)]
struct SaveArgs {
    /// Markdown story file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Story identifier (defaults to the leading digits of the file name)
    #[arg(long = "story", value_name = "NUM")]
    story: Option<String>,

    /// Target language code (defaults to drafts.default_language)
    #[arg(long = "language", value_name = "CODE")]
    language: Option<String>,

    /// Route the write through the debounce timer and wait for it
    #[arg(long = "deferred")]
    deferred: bool,
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    /// Emit records as JSON
    #[arg(long = "json")]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    draft: DraftArgs,

    /// Directory to write into (defaults to export.output_dir)
    #[arg(long = "output", value_name = "DIR")]
    output: Option<PathBuf>,

    /// Story currently displayed, as a number or a story file name such as
    /// `05-the-son.md`. Export is refused unless the stored draft belongs to it.
    #[arg(long = "expect-story", value_name = "NUM|FILE")]
    expect_story: Option<String>,
}

const DEFAULT_LOG_DIRECTIVES: &str = "warn,story_cli=info,story_drafts=info";

/// Install the stderr log subscriber. `RUST_LOG` overrides the default directives.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

/// Entry point for CLI execution. Returns the desired exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    let mut options = LoadOptions::default();
    if let Some(path) = &cli.config {
        options = options.with_override_path(path);
    }
    let config = Config::load(options)?;

    match cli.command {
        Command::Parse(args) => handle_parse(args),
        Command::Render(args) => handle_render(&config, args),
        Command::Template(args) => handle_template(args),
        Command::Save(args) => {
            let store = open_store(&config)?;
            block_on(handle_save(&config, &store, args))
        }
        Command::Show(args) => {
            let store = open_store(&config)?;
            block_on(handle_show(&config, &store, args))
        }
        Command::List(args) => {
            let store = open_store(&config)?;
            block_on(handle_list(&store, args))
        }
        Command::Clear => {
            let store = open_store(&config)?;
            block_on(handle_clear(&store))
        }
        Command::Export(args) => {
            let store = open_store(&config)?;
            block_on(handle_export(&config, &store, args))
        }
    }
}

/// Map a failure to the process exit code that describes it.
///
/// Everything else reports as an I/O or storage failure.
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if err.downcast_ref::<serde_json::Error>().is_some() {
        ExitCode::InvalidContent
    } else if err.downcast_ref::<ConfigError>().is_some() {
        ExitCode::InvalidArguments
    } else {
        ExitCode::Io
    }
}

fn open_store(config: &Config) -> Result<DraftStore> {
    let backend = SqliteBackend::open(&config.drafts.database)?;
    tracing::debug!(database = %config.drafts.database.display(), "draft database opened");
    Ok(DraftStore::new(Arc::new(backend)).with_delay(config.drafts.save_delay))
}

fn block_on<F>(future: F) -> Result<i32>
where
    F: Future<Output = Result<i32>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(future)
}

fn handle_parse(args: InputArgs) -> Result<i32> {
    let markdown = read_input(&args.input)?;
    emit_json(&parse(&markdown))?;
    Ok(ExitCode::Success as i32)
}

fn handle_render(config: &Config, args: InputArgs) -> Result<i32> {
    let json = read_input(&args.input)?;
    let content: Content = serde_json::from_str(&json)?;
    emit(&serialize_with(&content, &render_options(config)))?;
    Ok(ExitCode::Success as i32)
}

fn handle_template(args: InputArgs) -> Result<i32> {
    let markdown = read_input(&args.input)?;
    emit_json(&parse(&markdown).blank_template())?;
    Ok(ExitCode::Success as i32)
}

async fn handle_save(config: &Config, store: &DraftStore, args: SaveArgs) -> Result<i32> {
    let SaveArgs {
        file,
        story,
        language,
        deferred,
    } = args;

    let story = match story {
        Some(story) => story,
        None => {
            let name = file.file_name().and_then(|name| name.to_str()).unwrap_or("");
            match story_number(name) {
                Some(number) => number.to_string(),
                None => {
                    eprintln!(
                        "cannot tell the story number from '{}'; pass --story",
                        file.display()
                    );
                    return Ok(ExitCode::InvalidArguments as i32);
                }
            }
        }
    };
    let language = resolve_language(config, language);

    let markdown = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    let content = parse(&markdown);

    let record = if deferred {
        store.schedule_save(&story, &language, content)?;
        match store.settle().await {
            Some(outcome) => outcome?,
            None => bail!("scheduled save for {} disappeared", draft_key(&story, &language)),
        }
    } else {
        store.save(&story, &language, content).await?
    };

    emit(&format!("saved {}\n", record.key))?;
    Ok(ExitCode::Success as i32)
}

async fn handle_show(config: &Config, store: &DraftStore, args: DraftArgs) -> Result<i32> {
    let language = resolve_language(config, args.language);
    match store.get(&args.story, &language).await? {
        Some(record) => {
            emit_json(&record)?;
            Ok(ExitCode::Success as i32)
        }
        None => {
            eprintln!("no draft for {}", draft_key(&args.story, &language));
            Ok(ExitCode::NotFound as i32)
        }
    }
}

async fn handle_list(store: &DraftStore, args: ListArgs) -> Result<i32> {
    let mut records = store.get_all().await?;
    records.sort_by(|a, b| a.key.cmp(&b.key));

    if args.json {
        emit_json(&records)?;
        return Ok(ExitCode::Success as i32);
    }

    if records.is_empty() {
        emit("no drafts\n")?;
        return Ok(ExitCode::Success as i32);
    }

    let mut rendered = String::new();
    for record in &records {
        rendered.push_str(&describe(record));
        rendered.push('\n');
    }
    emit(&rendered)?;
    Ok(ExitCode::Success as i32)
}

async fn handle_clear(store: &DraftStore) -> Result<i32> {
    let count = store.get_all().await?.len();
    store.clear_all().await?;
    emit(&format!("cleared {count} drafts\n"))?;
    Ok(ExitCode::Success as i32)
}

async fn handle_export(config: &Config, store: &DraftStore, args: ExportArgs) -> Result<i32> {
    let ExportArgs {
        draft,
        output,
        expect_story,
    } = args;
    let language = resolve_language(config, draft.language);

    let Some(record) = store.get(&draft.story, &language).await? else {
        eprintln!("no draft for {}", draft_key(&draft.story, &language));
        return Ok(ExitCode::NotFound as i32);
    };

    // Compared against the story stored in the record, not the `--story` lookup.
    if let Some(displayed) = expect_story {
        let expected = displayed_story(&displayed);
        if expected != record.story_num {
            eprintln!(
                "draft {} belongs to story {}, not story {}",
                record.key, record.story_num, expected
            );
            return Ok(ExitCode::InvalidArguments as i32);
        }
    }

    let dir = output.unwrap_or_else(|| config.export.output_dir.clone());
    let path = dir.join(format!("{}.md", record.story_num));
    let markdown = serialize_with(&record.content, &render_options(config));
    fs::atomic_write(&path, &markdown)
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    emit(&format!("wrote {}\n", path.display()))?;
    Ok(ExitCode::Success as i32)
}

/// Story identifier named by `--expect-story`: the leading digits of a file
/// name, or the value itself.
fn displayed_story(value: &str) -> &str {
    Path::new(value)
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(story_number)
        .unwrap_or(value)
}

fn resolve_language(config: &Config, language: Option<String>) -> String {
    let language = language.unwrap_or_else(|| config.drafts.default_language.clone());
    if language_name(&language).is_none() {
        tracing::warn!(language = %language, "language is not in the supported list");
    }
    language
}

fn render_options(config: &Config) -> RenderOptions {
    RenderOptions {
        image_alt: config.export.image_alt.clone(),
    }
}

fn describe(record: &HistoryRecord) -> String {
    let language = language_name(&record.language).unwrap_or(record.language.as_str());
    format!(
        "{}\tstory {}\t{}\t{} sections\tedited {}",
        record.key,
        record.story_num,
        language,
        record.content.sections.len(),
        record.last_edited.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
}

fn emit_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut rendered = serde_json::to_string_pretty(value)?;
    rendered.push('\n');
    emit(&rendered)
}

fn emit(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
