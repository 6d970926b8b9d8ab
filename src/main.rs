use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cleanup;
mod commands;
mod config;
mod paths;
mod session;

use commands::ask::AskArgs;
use commands::chat::ChatArgs;
use commands::cleanup::CleanupArgs;
use commands::image::ImageArgs;
use commands::notebooks::NotebooksCommand;
use commands::session::SessionCommand;
use commands::App;

#[derive(Parser)]
#[command(name = "askweb")]
#[command(about = "Ask NotebookLM and Gemini from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: <data-dir>/config.yaml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the session, library and config
    #[arg(long, global = true, env = "ASKWEB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question to a NotebookLM notebook
    Ask(AskArgs),
    /// Ask Gemini a question
    Chat(ChatArgs),
    /// Generate images with Gemini
    Image(ImageArgs),
    /// Manage the notebook library
    #[command(subcommand)]
    Notebooks(NotebooksCommand),
    /// Manage the saved browser session
    #[command(subcommand)]
    Session(SessionCommand),
    /// Remove persisted state
    Cleanup(CleanupArgs),
}

/// Exit status for failures callers are expected to handle.
mod exit {
    pub const GENERAL: u8 = 1;
    pub const NOT_AUTHENTICATED: u8 = 2;
    pub const RESPONSE_TIMEOUT: u8 = 3;
    pub const UI_ELEMENT_NOT_FOUND: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG takes precedence
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let paths = paths::DataDir::resolve(cli.data_dir)?;
    let config = config::Config::load_or_default(cli.config.as_deref(), &paths.config_file())?;
    let app = App { config, paths };

    match cli.command {
        Command::Ask(args) => commands::ask::run(&app, args).await,
        Command::Chat(args) => commands::chat::run(&app, args).await,
        Command::Image(args) => commands::image::run(&app, args).await,
        Command::Notebooks(cmd) => commands::notebooks::run(&app, cmd),
        Command::Session(cmd) => commands::session::run(&app, cmd).await,
        Command::Cleanup(args) => commands::cleanup::run(&app, args),
    }
}

fn capture_error(err: &anyhow::Error) -> Option<&askweb_capture::Error> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<askweb_capture::Error>())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    use askweb_capture::Error;
    match capture_error(err) {
        Some(Error::NotAuthenticated) => exit::NOT_AUTHENTICATED,
        Some(Error::ResponseTimeout { .. }) => exit::RESPONSE_TIMEOUT,
        Some(Error::UiElementNotFound(_)) => exit::UI_ELEMENT_NOT_FOUND,
        _ => exit::GENERAL,
    }
}

/// Error summary on stderr. A partial answer from a timeout goes here too,
/// never to stdout.
fn report(err: &anyhow::Error) {
    eprintln!("Error: {:#}", err);
    match capture_error(err) {
        Some(askweb_capture::Error::NotAuthenticated) => {
            eprintln!("Run `askweb session setup` to sign in.");
        }
        Some(askweb_capture::Error::ResponseTimeout {
            partial: Some(partial),
            ..
        }) => {
            eprintln!("\nPartial response (incomplete):\n{}", partial);
        }
        _ => {}
    }
}
