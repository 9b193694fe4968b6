use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use gemini_batch::ai::{AspectRatio, GeminiService};
use gemini_batch::batch::{BATCH_CONCURRENCY, plan_chunks};
use gemini_batch::config::{self, MAX_IMAGES_PER_TASK};
use gemini_batch::export::ExportOutcome;
use gemini_batch::session::Session;
use gemini_batch::task::TaskStatus;

#[derive(Parser, Debug)]
#[command(
    name = "gemini-batch",
    version,
    about = "Batch image generation with Google Gemini — prompt files, reference matching, zip export"
)]
struct Cli {
    /// Text file with one prompt per line (repeatable)
    #[arg(short, long, value_name = "FILE")]
    prompts: Vec<PathBuf>,

    /// A single prompt (repeatable), added after the prompt files
    #[arg(long = "prompt", value_name = "TEXT")]
    inline_prompts: Vec<String>,

    /// Reference image files or directories; file names are matched against prompts
    #[arg(short, long, value_name = "PATH")]
    refs: Vec<PathBuf>,

    /// Output aspect ratio: 1:1, 3:4, 4:3, 9:16 or 16:9
    #[arg(short, long, value_name = "RATIO")]
    aspect_ratio: Option<AspectRatio>,

    /// Images to generate per prompt (1-4)
    #[arg(short = 'n', long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..=MAX_IMAGES_PER_TASK as i64))]
    count: Option<u8>,

    /// Zip archive to write (default: gemini_batch_output.zip)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Also save every image individually into this directory
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Show tasks, matched references and chunks without calling the API
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.prompts.is_empty() && cli.inline_prompts.is_empty() {
        anyhow::bail!("No prompts specified. Use --prompts FILE or --prompt TEXT (see --help).");
    }

    // Load config, CLI flags win
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(ratio) = cli.aspect_ratio {
        config.generation.aspect_ratio = ratio;
    }
    if let Some(count) = cli.count {
        config.generation.images_per_task = count;
    }
    config.generation.validate()?;

    let mut session = Session::new(config.generation);

    // References first so every imported prompt is matched against them
    if !cli.refs.is_empty() {
        session.import_references(&cli.refs);
    }
    for path in &cli.prompts {
        session.import_prompts_file(path);
    }
    for prompt in &cli.inline_prompts {
        session.import_prompt_text(prompt);
    }

    if session.tasks().is_empty() {
        anyhow::bail!("No prompts found in the specified inputs.");
    }

    log::info!(
        "{} task(s), {} reference image(s), {} image(s) per task at {}",
        session.tasks().len(),
        session.library().len(),
        session.settings().images_per_task,
        session.settings().aspect_ratio
    );

    if cli.dry_run {
        print_plan(&session);
        return Ok(());
    }

    let api_key = config.gemini.resolved_api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No Gemini API key configured. Run `gemini-batch --init`, then set gemini.api_key or export GEMINI_API_KEY."
        )
    })?;
    let service = GeminiService::new(api_key, config.gemini.model.clone());

    let summary = session.generate_all(&service).await?;

    for (i, task) in session.tasks().iter().enumerate() {
        match task.status {
            TaskStatus::Success => log::info!(
                "  #{} {} image(s): {}",
                i + 1,
                task.generated_images.len(),
                task.prompt
            ),
            TaskStatus::Error => log::error!(
                "  #{} Error: {} ({})",
                i + 1,
                task.error.as_deref().unwrap_or("unknown"),
                task.prompt
            ),
            _ => {}
        }
    }

    // Export
    let archive = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.archive_name));
    match session.export_archive(&archive)? {
        ExportOutcome::Empty => log::warn!("No images to download."),
        ExportOutcome::Written { path, files, bytes } => {
            log::info!("Archive: {} ({files} image(s), {bytes} bytes)", path.display())
        }
    }

    let save_dir = cli
        .save_dir
        .clone()
        .or_else(|| config.output.save_dir.as_ref().map(PathBuf::from));
    if let Some(dir) = save_dir {
        let saved = session.save_all(&dir)?;
        log::info!("Saved {} image(s) to {}", saved.len(), dir.display());
    }

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = session
            .tasks()
            .iter()
            .enumerate()
            .map(|(i, t)| {
                serde_json::json!({
                    "position": i + 1,
                    "prompt": t.prompt,
                    "status": t.status,
                    "reference_images": t.reference_images.len(),
                    "generated_images": t.generated_images.len(),
                    "error": t.error,
                })
            })
            .collect();

        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "summary": summary,
                "tasks": json_results,
            }))?
        );
    }

    // Summary
    log::info!(
        "Done: {} succeeded, {} failed out of {} task(s)",
        summary.succeeded,
        summary.failed,
        summary.attempted
    );

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the prompt column before wrapping.
const VAL_WIDTH: usize = 56;
/// Indent for continuation lines.
const INDENT: &str = "             ";

/// Print the task table and the chunk plan for `--dry-run`.
fn print_plan(session: &Session) {
    println!();
    println!("  {BOLD}Tasks:{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(72));

    for (i, task) in session.tasks().iter().enumerate() {
        let refs = task.reference_images.len();
        let marker = if refs > 0 {
            format!("{GREEN}{refs} ref{RESET}")
        } else {
            format!("{DIM}0 ref{RESET}")
        };
        let lines = wrap_text(&task.prompt, VAL_WIDTH);
        for (n, line) in lines.iter().enumerate() {
            if n == 0 {
                println!("  {:>4}  {marker}  {line}", i + 1);
            } else {
                println!("  {INDENT}{line}");
            }
        }
    }

    let pending = session.pending_ids();
    let chunks = plan_chunks(&pending, BATCH_CONCURRENCY);

    println!("  {DIM}{}{RESET}", "─".repeat(72));
    println!(
        "  {BOLD}{}{RESET} task(s) in {BOLD}{}{RESET} chunk(s) of up to {BATCH_CONCURRENCY}, {} image(s) each at {}",
        pending.len(),
        chunks.len(),
        session.settings().images_per_task,
        session.settings().aspect_ratio
    );
    println!();
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
