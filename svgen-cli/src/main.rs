use clap::{Args, Parser, Subcommand};
use std::error::Error as _;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};
use svgen_claude::{
    ClaudeClient, ClaudeError, ClientSettings, RetryPolicy, SvgGenerator, SvgRequest,
    build_prompt,
};
use svgen_config::{ApiSettings, Config, ConfigError, load_existing, load_or_init, save};
use svgen_output::{OutputError, WriteOptions, check_target, read_svg, write_svg};
use thiserror::Error;

const EXIT_USAGE: u8 = 2;
const EXIT_CONFIG: u8 = 3;
const EXIT_IO: u8 = 4;
const EXIT_TRANSPORT: u8 = 5;
const EXIT_API: u8 = 6;

/// svgen CLI entry point.
///
/// Sends a natural-language prompt to the Anthropic Messages API and writes
/// the SVG document it answers with.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "svgen",
    author,
    version,
    about = "Create and edit SVG files from natural-language prompts.",
    long_about = None
)]
struct Cli {
    /// Log request and retry details to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Create a new SVG file from a text prompt.
    Create(CreateArgs),
    /// Edit an existing SVG file with a text prompt.
    Edit(EditArgs),
    /// Store the API key in the svgen config file.
    SetApiKey(SetApiKeyArgs),
}

#[derive(Args, Debug, Clone)]
struct CreateArgs {
    /// Output SVG file path.
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,
    /// Replace the output file if it already exists.
    #[arg(long)]
    force: bool,
    /// Description of the image to create.
    #[arg(value_name = "PROMPT")]
    prompt: String,
}

#[derive(Args, Debug, Clone)]
struct EditArgs {
    /// SVG file to start from.
    #[arg(short, long, value_name = "PATH")]
    input: PathBuf,
    /// Output SVG file path.
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,
    /// Replace the output file if it already exists.
    #[arg(long)]
    force: bool,
    /// Changes to apply to the input SVG.
    #[arg(value_name = "PROMPT")]
    prompt: String,
}

#[derive(Args, Debug, Clone)]
struct SetApiKeyArgs {
    /// Anthropic API key.
    #[arg(value_name = "KEY")]
    key: String,
}

#[derive(Debug, Error)]
enum SvgenError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error(transparent)]
    Api(#[from] ClaudeError),
    #[error("SVG generation worker panicked")]
    WorkerPanicked,
}

impl SvgenError {
    /// Maps each error to its `EXIT_*` category; an existing output without `--force` counts as usage.
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => EXIT_USAGE,
            Self::Config(_) => EXIT_CONFIG,
            Self::Output(OutputError::AlreadyExists { .. }) => EXIT_USAGE,
            Self::Output(_) => EXIT_IO,
            Self::Api(ClaudeError::MissingApiKey | ClaudeError::Unauthorized { .. }) => EXIT_CONFIG,
            Self::Api(ClaudeError::Transport(_)) => EXIT_TRANSPORT,
            Self::Api(_) | Self::WorkerPanicked => EXIT_API,
        }
    }
}

/// A validated request plus where its result goes.
#[derive(Debug)]
struct Job {
    request: SvgRequest,
    input: Option<PathBuf>,
    output: PathBuf,
    write_options: WriteOptions,
}

impl Job {
    fn announcement(&self) -> String {
        match &self.input {
            Some(input) => format!(
                "Editing SVG {} with prompt: {}",
                input.display(),
                self.request.prompt()
            ),
            None => format!("Creating SVG from prompt: {}", self.request.prompt()),
        }
    }

    fn completion(&self, path: &Path) -> String {
        match self.request {
            SvgRequest::Create { .. } => format!("SVG created successfully: {}", path.display()),
            SvgRequest::Edit { .. } => format!("SVG edited successfully: {}", path.display()),
        }
    }
}

impl CreateArgs {
    fn into_job(self) -> Result<Job, SvgenError> {
        let prompt = require_prompt(self.prompt)?;
        let write_options = WriteOptions {
            overwrite: self.force,
        };
        check_target(&self.output, write_options)?;

        Ok(Job {
            request: SvgRequest::Create { prompt },
            input: None,
            output: self.output,
            write_options,
        })
    }
}

impl EditArgs {
    fn into_job(self) -> Result<Job, SvgenError> {
        let prompt = require_prompt(self.prompt)?;
        let existing_markup = read_svg(&self.input)?;
        let write_options = WriteOptions {
            overwrite: self.force,
        };
        check_target(&self.output, write_options)?;

        Ok(Job {
            request: SvgRequest::Edit {
                prompt,
                existing_markup,
            },
            input: Some(self.input),
            output: self.output,
            write_options,
        })
    }
}

fn require_prompt(prompt: String) -> Result<String, SvgenError> {
    if prompt.trim().is_empty() {
        return Err(SvgenError::Usage("prompt must not be empty".to_string()));
    }
    Ok(prompt)
}

fn generate_with_progress<G>(generator: &G, instruction: &str) -> Result<String, SvgenError>
where
    G: SvgGenerator + Sync,
{
    thread::scope(|scope| {
        let spawned = thread::Builder::new()
            .name("svgen-request".into())
            .spawn_scoped(scope, || generator.generate(instruction));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(error) => {
                log::debug!("could not spawn progress worker ({error}); running inline");
                return generator.generate(instruction).map_err(SvgenError::from);
            }
        };

        const SPINNER_FRAMES: &[&str] = &["|", "/", "-", "\\"];
        let mut frame_index = 0;
        let interval = Duration::from_millis(200);
        let start = Instant::now();

        eprint!("Generating SVG ");
        let _ = io::stderr().flush();

        while !handle.is_finished() {
            eprint!("\rGenerating SVG {}", SPINNER_FRAMES[frame_index]);
            let _ = io::stderr().flush();
            frame_index = (frame_index + 1) % SPINNER_FRAMES.len();
            thread::sleep(interval);
        }

        match handle.join() {
            Ok(result) => {
                eprintln!(
                    "\rGenerating SVG ... finished in {:.1}s",
                    start.elapsed().as_secs_f32()
                );
                result.map_err(SvgenError::from)
            }
            Err(_) => {
                eprintln!("\rGenerating SVG ... failed: worker panicked");
                Err(SvgenError::WorkerPanicked)
            }
        }
    })
}

/// Run one validated job: connect, generate, and write the result.
///
/// `connect` only runs once the job is known to be valid, so usage and input
/// errors never reach the network.
fn generate<G, F>(job: Job, connect: F, show_progress: bool) -> Result<PathBuf, SvgenError>
where
    G: SvgGenerator + Sync,
    F: FnOnce() -> Result<G, SvgenError>,
{
    eprintln!("{}", job.announcement());

    let generator = connect()?;
    let instruction = build_prompt(&job.request);
    log::debug!("instruction is {} bytes", instruction.len());

    let markup = if show_progress {
        generate_with_progress(&generator, &instruction)?
    } else {
        generator.generate(&instruction)?
    };

    let path = write_svg(&job.output, &markup, job.write_options)?;
    eprintln!("{}", job.completion(&path));
    Ok(path)
}

fn client_settings(api: &ApiSettings) -> ClientSettings {
    ClientSettings {
        base_url: api.base_url.clone(),
        model: api.model.clone(),
        max_tokens: api.max_tokens,
        timeout: Duration::from_secs(api.timeout_secs),
        retry: RetryPolicy {
            max_retries: api.max_retries,
            ..RetryPolicy::default()
        },
    }
}

/// Configuration for a generation run. Never creates or rewrites the file.
fn generation_config() -> Config {
    match load_existing() {
        Ok(Some(config)) => config,
        Ok(None) => {
            log::debug!("no svgen configuration file; using defaults");
            Config::default()
        }
        Err(error) => {
            log::warn!("failed to load svgen configuration ({error}); falling back to defaults");
            Config::default()
        }
    }
}

fn connect_claude() -> Result<ClaudeClient, SvgenError> {
    let config = generation_config();
    let api = &config.anthropic_api;
    let api_key = config.resolve_api_key()?;
    let client = ClaudeClient::new(api_key, client_settings(api))?;
    log::debug!("using {} at {}", api.model, client.endpoint());
    Ok(client)
}

fn set_api_key(key: &str) -> Result<PathBuf, SvgenError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(SvgenError::Usage("API key must not be empty".to_string()));
    }
    if key.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(SvgenError::Usage(
            "API key must not contain whitespace or control characters".to_string(),
        ));
    }

    let outcome = load_or_init()?;
    let mut config = outcome.config;
    config.anthropic_api.api_key = key.to_string();
    save(&config, &outcome.path)?;
    eprintln!("Updated API key in {}", outcome.path.display());
    Ok(outcome.path)
}

fn run(cli: Cli) -> Result<(), SvgenError> {
    let job = match cli.command {
        Command::SetApiKey(args) => return set_api_key(&args.key).map(|_| ()),
        Command::Create(args) => args.into_job()?,
        Command::Edit(args) => args.into_job()?,
    };

    let show_progress = !cli.verbose && io::stderr().is_terminal();
    generate(job, connect_claude, show_progress)?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn report(error: &SvgenError) {
    let message = error.to_string();
    eprintln!("Error: {message}");

    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            eprintln!("  caused by: {cause_text}");
        }
        source = cause.source();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error);
            ExitCode::from(error.exit_code())
        }
    }
}
