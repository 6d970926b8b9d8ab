//! `image`: generate images with Gemini and save them locally.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use askweb_capture::{ImageBatch, ImageOptions, Mode, Payload, GEMINI};
use clap::Args;
use tracing::warn;

use super::{run_exchange, App, Exchange};

#[derive(Args, Debug)]
pub struct ImageArgs {
    /// Image generation prompt
    #[arg(long)]
    pub prompt: String,

    /// Output directory for images
    #[arg(long, default_value = ".")]
    pub output: PathBuf,

    /// Show the browser window
    #[arg(long)]
    pub show_browser: bool,

    /// On failure, leave the visible browser open for inspection
    #[arg(long)]
    pub keep_open: bool,
}

pub async fn run(app: &App, args: ImageArgs) -> Result<ExitCode> {
    let result = run_exchange(
        app,
        Exchange {
            site: GEMINI,
            url: GEMINI.home_url,
            prompt: &args.prompt,
            mode: Mode::ImageGeneration,
            show_browser: args.show_browser,
            keep_open: args.keep_open,
            timeout: app.config.image_timeout(),
            images: Some(ImageOptions {
                output_dir: args.output.clone(),
                ..ImageOptions::default()
            }),
        },
    )
    .await?;

    let Payload::Images(batch) = result.payload else {
        anyhow::bail!("expected images, got a text response");
    };
    for failure in &batch.failures {
        warn!("{}", askweb_capture::Error::from(failure.clone()));
    }
    if let Err(e) = ensure_saved(&batch) {
        eprintln!("Error: {:#}", e);
        return Ok(ExitCode::FAILURE);
    }

    println!("{}", format_batch(&args.prompt, &batch));
    Ok(ExitCode::SUCCESS)
}

/// A batch with nothing on disk fails with the first image's error.
fn ensure_saved(batch: &ImageBatch) -> Result<()> {
    if !batch.saved.is_empty() {
        return Ok(());
    }
    match batch.failures.first() {
        Some(failure) => Err(askweb_capture::Error::from(failure.clone()))
            .context("no images were saved"),
        None => anyhow::bail!("the response contained no images"),
    }
}

fn format_batch(prompt: &str, batch: &ImageBatch) -> String {
    let rule = "=".repeat(60);
    let mut out = format!("{rule}\nPrompt: {prompt}\n{rule}\n\nGenerated images:");
    for path in &batch.saved {
        out.push_str(&format!("\n  - {}", path.display()));
    }
    if !batch.failures.is_empty() {
        out.push_str(&format!("\n\n{} image(s) could not be saved", batch.failures.len()));
    }
    out.push_str(&format!("\n\n{rule}"));
    out
}
