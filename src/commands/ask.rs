//! `ask`: a question to a NotebookLM notebook.

use std::process::ExitCode;

use anyhow::Result;
use askweb_capture::{Mode, NOTEBOOKLM};
use askweb_library::Library;
use clap::Args;
use tracing::{info, warn};

use super::{print_answer, run_exchange, App, Exchange};

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Question to ask
    #[arg(long)]
    pub question: String,

    /// Registry id of the notebook to query
    #[arg(long, conflicts_with = "notebook_url")]
    pub notebook_id: Option<String>,

    /// Notebook URL to query directly
    #[arg(long)]
    pub notebook_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub show_browser: bool,

    /// On failure, leave the visible browser open for inspection
    #[arg(long)]
    pub keep_open: bool,
}

/// Which notebook a question goes to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    /// Given on the command line; not tracked in the registry.
    Url(String),
    Notebook { id: String, url: String },
}

impl Target {
    pub fn url(&self) -> &str {
        match self {
            Target::Url(url) => url,
            Target::Notebook { url, .. } => url,
        }
    }
}

/// Explicit id, then the configured default, then the active notebook.
pub(crate) fn resolve_in_library(
    notebook_id: Option<&str>,
    default_notebook: Option<&str>,
    library: &Library,
) -> askweb_library::Result<Target> {
    let entry = match notebook_id.or(default_notebook) {
        Some(id) => library.get(id)?,
        None => library.get_active()?,
    };
    Ok(Target::Notebook {
        id: entry.id.clone(),
        url: entry.url.clone(),
    })
}

pub async fn run(app: &App, args: AskArgs) -> Result<ExitCode> {
    let (target, library) = match &args.notebook_url {
        Some(url) => {
            if !NOTEBOOKLM.owns(url) {
                warn!("{} is not a NotebookLM address", url);
            }
            (Target::Url(url.clone()), None)
        }
        None => {
            let library = Library::open(app.paths.library())?;
            let target = resolve_in_library(
                args.notebook_id.as_deref(),
                app.config.default_notebook.as_deref(),
                &library,
            )?;
            (target, Some(library))
        }
    };
    if let Target::Notebook { id, .. } = &target {
        info!("Using notebook {}", id);
    }

    let result = run_exchange(
        app,
        Exchange {
            site: NOTEBOOKLM,
            url: target.url(),
            prompt: &args.question,
            mode: Mode::TextQuery,
            show_browser: args.show_browser,
            keep_open: args.keep_open,
            timeout: app.config.response_timeout(),
            images: None,
        },
    )
    .await?;

    print_answer(&args.question, &result);

    if let (Target::Notebook { id, .. }, Some(mut library)) = (&target, library) {
        if let Err(e) = library.touch(id) {
            warn!("Could not record use of {}: {}", id, e);
        }
    }
    Ok(ExitCode::SUCCESS)
}
