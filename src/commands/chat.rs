//! `chat`: a question to Gemini in a fresh conversation.

use std::process::ExitCode;

use anyhow::Result;
use askweb_capture::{Mode, GEMINI};
use clap::Args;

use super::{print_answer, run_exchange, App, Exchange};

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Question to ask
    #[arg(long)]
    pub question: String,

    /// Show the browser window
    #[arg(long)]
    pub show_browser: bool,

    /// On failure, leave the visible browser open for inspection
    #[arg(long)]
    pub keep_open: bool,
}

pub async fn run(app: &App, args: ChatArgs) -> Result<ExitCode> {
    let result = run_exchange(
        app,
        Exchange {
            site: GEMINI,
            url: GEMINI.home_url,
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
    Ok(ExitCode::SUCCESS)
}
