//! `notebooks`: manage the local notebook registry.

use std::process::ExitCode;

use anyhow::Result;
use askweb_library::{Library, LibraryStats, NewNotebook, NotebookEntry};
use clap::Subcommand;

use super::App;

#[derive(Subcommand, Debug)]
pub enum NotebooksCommand {
    /// Register a notebook
    Add {
        /// Notebook URL (https://notebooklm.google.com/notebook/...)
        #[arg(long)]
        url: String,

        /// Display name; its slug becomes the id
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Comma-separated topics
        #[arg(long, default_value = "")]
        topics: String,
    },
    /// List all notebooks
    List,
    /// Find notebooks by name, description or topic
    Search {
        #[arg(long)]
        query: String,
    },
    /// Make a notebook the default for `ask`
    Activate {
        #[arg(long)]
        id: String,
    },
    /// Delete a notebook from the registry
    Remove {
        #[arg(long)]
        id: String,
    },
    /// Show library statistics
    Stats,
}

pub fn run(app: &App, command: NotebooksCommand) -> Result<ExitCode> {
    let mut library = Library::open(app.paths.library())?;
    let output = execute(&mut library, command)?;
    println!("{}", output);
    Ok(ExitCode::SUCCESS)
}

fn execute(library: &mut Library, command: NotebooksCommand) -> Result<String> {
    let out = match command {
        NotebooksCommand::Add {
            url,
            name,
            description,
            topics,
        } => {
            let entry = library.add(
                NewNotebook::new(url, name)
                    .description(description)
                    .topics_csv(&topics),
            )?;
            format!("Added notebook '{}'\n{}", entry.id, details(entry))
        }
        NotebooksCommand::List => listing(library.list().iter(), "No notebooks registered."),
        NotebooksCommand::Search { query } => listing(
            library.search(&query).into_iter(),
            &format!("No notebooks match '{}'.", query),
        ),
        NotebooksCommand::Activate { id } => {
            let entry = library.activate(&id)?;
            format!("Activated notebook '{}' ({})", entry.id, entry.name)
        }
        NotebooksCommand::Remove { id } => {
            let entry = library.remove(&id)?;
            format!("Removed notebook '{}' ({})", entry.id, entry.name)
        }
        NotebooksCommand::Stats => format_stats(&library.stats()),
    };
    Ok(out)
}

fn listing<'a>(entries: impl Iterator<Item = &'a NotebookEntry>, empty: &str) -> String {
    let lines: Vec<String> = entries.map(|e| e.to_string()).collect();
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

fn details(entry: &NotebookEntry) -> String {
    let mut out = format!("  url: {}\n  name: {}", entry.url, entry.name);
    if !entry.description.is_empty() {
        out.push_str(&format!("\n  description: {}", entry.description));
    }
    if !entry.topics.is_empty() {
        let topics: Vec<&str> = entry.topics.iter().map(String::as_str).collect();
        out.push_str(&format!("\n  topics: {}", topics.join(", ")));
    }
    out
}

fn format_stats(stats: &LibraryStats) -> String {
    format!(
        "Notebooks: {}\nTopics: {}\nTotal uses: {}\nActive: {}\nMost used: {}",
        stats.total_notebooks,
        stats.total_topics,
        stats.total_uses,
        stats.active_notebook_id.as_deref().unwrap_or("none"),
        stats.most_used.as_deref().unwrap_or("none"),
    )
}
