//! `cleanup`: delete persisted state.

use std::io::{BufRead, Write};
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::App;
use crate::cleanup::CleanupPlan;

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Actually delete; without this only the plan is shown
    #[arg(long)]
    pub confirm: bool,

    /// Keep the notebook library
    #[arg(long)]
    pub preserve_library: bool,

    /// Skip the interactive confirmation
    #[arg(long)]
    pub force: bool,
}

pub fn run(app: &App, args: CleanupArgs) -> Result<ExitCode> {
    let plan = CleanupPlan::build(&app.paths, args.preserve_library)?;
    println!("Data directory: {}", app.paths.root().display());
    print!("{}", plan);

    if plan.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    if !args.confirm {
        println!("Dry run. Re-run with --confirm to delete.");
        return Ok(ExitCode::SUCCESS);
    }
    if !args.force {
        let stdin = std::io::stdin();
        if !ask_yes_no("Delete these files? [y/N] ", &mut stdin.lock())? {
            println!("Aborted.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let removed = plan.execute()?;
    println!("Removed {} item(s).", removed);
    Ok(ExitCode::SUCCESS)
}

fn ask_yes_no(question: &str, input: &mut impl BufRead) -> Result<bool> {
    print!("{}", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
