//! # askweb-library
//!
//! Registry of NotebookLM notebooks, persisted as one JSON document.
//!
//! The [`Library`] is the only reader and writer of that document. Every
//! mutation is applied to a copy of the in-memory snapshot, written back in
//! full, and only then committed, so a failed write leaves the snapshot as it
//! was. At most one notebook is active; the active id lives in the document
//! itself so it survives across invocations.
//!
//! ```rust,no_run
//! use askweb_library::{Library, NewNotebook};
//!
//! # fn main() -> askweb_library::Result<()> {
//! let mut library = Library::open("library.json")?;
//! library.add(
//!     NewNotebook::new("https://notebooklm.google.com/notebook/abc123", "Project Docs")
//!         .topics_csv("api,architecture"),
//! )?;
//! library.activate("project-docs")?;
//! assert_eq!(library.get_active()?.id, "project-docs");
//! # Ok(())
//! # }
//! ```

mod entry;
mod slug;

pub use entry::{NewNotebook, NotebookEntry};
pub use slug::slugify;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Host every notebook URL must live on.
pub const NOTEBOOK_HOST: &str = "notebooklm.google.com";

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Registry failures. All are local validation or I/O errors; none is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("notebook not found: {0}")]
    NotFound(String),

    #[error("notebook id already exists: {0}")]
    DuplicateId(String),

    #[error("invalid notebook url '{0}': expected https://{host}/notebook/<id>", host = NOTEBOOK_HOST)]
    InvalidUrl(String),

    #[error("invalid notebook name '{0}': it must contain at least one letter or digit")]
    InvalidName(String),

    #[error("no active notebook (activate one with `notebooks activate --id <id>`)")]
    NoneActive,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("library document is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    notebooks: Vec<NotebookEntry>,
    #[serde(default)]
    active_notebook_id: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl Document {
    fn position(&self, id: &str) -> Option<usize> {
        self.notebooks.iter().position(|n| n.id == id)
    }

    /// Re-derive every `is_active` flag from `active_notebook_id`.
    /// Returns true when anything had to change.
    fn sync_active(&mut self) -> bool {
        let mut changed = false;
        if let Some(ref id) = self.active_notebook_id {
            if self.position(id).is_none() {
                warn!("active notebook '{}' no longer exists, clearing", id);
                self.active_notebook_id = None;
                changed = true;
            }
        }
        let active = self.active_notebook_id.as_deref();
        for notebook in &mut self.notebooks {
            let is_active = Some(notebook.id.as_str()) == active;
            if notebook.is_active != is_active {
                notebook.is_active = is_active;
                changed = true;
            }
        }
        changed
    }
}

/// Aggregate figures for `notebooks stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryStats {
    pub total_notebooks: usize,
    pub total_topics: usize,
    pub total_uses: u64,
    pub active_notebook_id: Option<String>,
    pub most_used: Option<String>,
}

/// The notebook registry.
#[derive(Debug)]
pub struct Library {
    path: PathBuf,
    doc: Document,
}

impl Library {
    /// Load the document at `path`. A missing file is an empty library.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = read_document(&path)?;
        debug!("opened library with {} notebooks", doc.notebooks.len());
        Ok(Self { path, doc })
    }

    /// Pick up changes other processes wrote since this instance last
    /// touched the document. Every mutation starts from here.
    fn reload(&mut self) -> Result<()> {
        self.doc = read_document(&self.path)?;
        Ok(())
    }

    /// Register a notebook. The id is the slug of its name.
    pub fn add(&mut self, new: NewNotebook) -> Result<&NotebookEntry> {
        validate_url(&new.url)?;
        self.reload()?;
        let id = slugify(&new.name);
        if id.is_empty() {
            return Err(Error::InvalidName(new.name));
        }
        if self.doc.position(&id).is_some() {
            return Err(Error::DuplicateId(id));
        }

        let entry = NotebookEntry {
            id,
            url: new.url.trim().to_string(),
            name: new.name.trim().to_string(),
            description: new.description.trim().to_string(),
            topics: entry::normalize_topics(&new.topics),
            created_at: Utc::now(),
            last_used_at: None,
            use_count: 0,
            is_active: false,
        };
        debug!("adding notebook '{}'", entry.id);

        let index = self.commit(|doc| {
            doc.notebooks.push(entry);
            Ok(doc.notebooks.len() - 1)
        })?;
        Ok(&self.doc.notebooks[index])
    }

    /// All notebooks in insertion order.
    pub fn list(&self) -> &[NotebookEntry] {
        &self.doc.notebooks
    }

    /// Notebooks whose name, description or any topic contains `query`,
    /// ignoring case.
    pub fn search(&self, query: &str) -> Vec<&NotebookEntry> {
        let needle = query.to_lowercase();
        self.doc
            .notebooks
            .iter()
            .filter(|n| n.matches(&needle))
            .collect()
    }

    /// Look up a notebook by id.
    pub fn get(&self, id: &str) -> Result<&NotebookEntry> {
        self.doc
            .position(id)
            .map(|i| &self.doc.notebooks[i])
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Make `id` the only active notebook.
    pub fn activate(&mut self, id: &str) -> Result<&NotebookEntry> {
        self.reload()?;
        let index = self
            .doc
            .position(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.commit(|doc| {
            doc.active_notebook_id = Some(id.to_string());
            Ok(())
        })?;
        Ok(&self.doc.notebooks[index])
    }

    /// Delete a notebook. Removing the active one leaves nothing active.
    pub fn remove(&mut self, id: &str) -> Result<NotebookEntry> {
        self.reload()?;
        let index = self
            .doc
            .position(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let removed = self.commit(|doc| {
            if doc.active_notebook_id.as_deref() == Some(id) {
                doc.active_notebook_id = None;
            }
            Ok(doc.notebooks.remove(index))
        })?;
        debug!("removed notebook '{}'", removed.id);
        Ok(removed)
    }

    /// The active notebook.
    pub fn get_active(&self) -> Result<&NotebookEntry> {
        let id = self
            .doc
            .active_notebook_id
            .as_deref()
            .ok_or(Error::NoneActive)?;
        self.get(id).map_err(|_| Error::NoneActive)
    }

    /// Record a successful query against `id`.
    pub fn touch(&mut self, id: &str) -> Result<&NotebookEntry> {
        self.reload()?;
        let index = self
            .doc
            .position(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.commit(|doc| {
            let notebook = &mut doc.notebooks[index];
            notebook.last_used_at = Some(Utc::now());
            notebook.use_count += 1;
            Ok(())
        })?;
        Ok(&self.doc.notebooks[index])
    }

    /// Summary figures over the whole library.
    pub fn stats(&self) -> LibraryStats {
        let topics: BTreeSet<&str> = self
            .doc
            .notebooks
            .iter()
            .flat_map(|n| n.topics.iter().map(String::as_str))
            .collect();
        let most_used = self
            .doc
            .notebooks
            .iter()
            .filter(|n| n.use_count > 0)
            // max_by_key keeps the last maximum; reverse so ties go to the oldest entry.
            .rev()
            .max_by_key(|n| n.use_count)
            .map(|n| n.id.clone());
        LibraryStats {
            total_notebooks: self.doc.notebooks.len(),
            total_topics: topics.len(),
            total_uses: self.doc.notebooks.iter().map(|n| n.use_count).sum(),
            active_notebook_id: self.doc.active_notebook_id.clone(),
            most_used,
        }
    }

    /// Apply `mutate` to a copy of the document, persist it, then swap it in.
    fn commit<T>(&mut self, mutate: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
        let mut next = self.doc.clone();
        let out = mutate(&mut next)?;
        next.sync_active();
        next.updated_at = Some(Utc::now());
        write_document(&self.path, &next)?;
        self.doc = next;
        Ok(out)
    }
}

fn read_document(path: &Path) -> Result<Document> {
    let mut doc = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            Document::default()
        } else {
            serde_json::from_str(&content)?
        }
    } else {
        Document::default()
    };
    if doc.sync_active() {
        debug!("repaired active flags in {}", path.display());
    }
    Ok(doc)
}

fn write_document(path: &Path, doc: &Document) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(doc)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Accept only `https://notebooklm.google.com/notebook/<id>` style addresses.
pub fn validate_url(raw: &str) -> Result<()> {
    let invalid = || Error::InvalidUrl(raw.to_string());
    let parsed = url::Url::parse(raw.trim()).map_err(|_| invalid())?;
    if parsed.scheme() != "https" || parsed.host_str() != Some(NOTEBOOK_HOST) {
        return Err(invalid());
    }
    let notebook = parsed
        .path()
        .strip_prefix("/notebook/")
        .map(|rest| rest.trim_end_matches('/'))
        .unwrap_or("");
    if notebook.is_empty() {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://notebooklm.google.com/notebook/abc123";

    fn library() -> (TempDir, Library) {
        let dir = tempfile::tempdir().unwrap();
        let lib = Library::open(dir.path().join("library.json")).unwrap();
        (dir, lib)
    }

    fn project_docs() -> NewNotebook {
        NewNotebook::new(URL, "Project Docs")
            .description("Internal API and architecture notes")
            .topics_csv("api,architecture")
    }

    fn active_count(lib: &Library) -> usize {
        lib.list().iter().filter(|n| n.is_active).count()
    }

    #[test]
    fn add_list_activate_scenario() {
        let (_dir, mut lib) = library();
        let id = lib.add(project_docs()).unwrap().id.clone();
        assert_eq!(id, "project-docs");
        assert_eq!(lib.list().len(), 1);

        lib.activate("project-docs").unwrap();
        assert_eq!(lib.get_active().unwrap().id, "project-docs");
    }

    #[test]
    fn add_round_trips_all_fields() {
        let (dir, mut lib) = library();
        lib.add(
            NewNotebook::new(URL, "Project Docs")
                .description("desc")
                .topics(["architecture", "api", "api"]),
        )
        .unwrap();

        let reopened = Library::open(dir.path().join("library.json")).unwrap();
        let matches: Vec<_> = reopened
            .list()
            .iter()
            .filter(|n| n.url == URL && n.name == "Project Docs" && n.description == "desc")
            .collect();
        assert_eq!(matches.len(), 1);
        let expected: BTreeSet<String> = ["api", "architecture"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(matches[0].topics, expected);
        assert!(!matches[0].is_active);
        assert!(matches[0].last_used_at.is_none());
    }

    #[test]
    fn duplicate_slug_rejected() {
        let (_dir, mut lib) = library();
        lib.add(project_docs()).unwrap();
        let err = lib
            .add(NewNotebook::new(
                "https://notebooklm.google.com/notebook/other",
                "project  DOCS!",
            ))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId(ref id) if id == "project-docs"));
        assert_eq!(lib.list().len(), 1);
        assert_eq!(lib.list()[0].url, URL);
    }

    #[test]
    fn invalid_url_rejected() {
        let (_dir, mut lib) = library();
        for bad in [
            "not a url",
            "http://notebooklm.google.com/notebook/abc",
            "https://example.com/notebook/abc",
            "https://notebooklm.google.com/",
            "https://notebooklm.google.com/notebook/",
        ] {
            let err = lib.add(NewNotebook::new(bad, "Docs")).unwrap_err();
            assert!(matches!(err, Error::InvalidUrl(_)), "accepted {bad}");
        }
        assert!(lib.list().is_empty());
    }

    #[test]
    fn invalid_name_rejected() {
        let (_dir, mut lib) = library();
        let err = lib.add(NewNotebook::new(URL, " -- ")).unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
    }

    #[test]
    fn list_preserves_insertion_order() {
        let (_dir, mut lib) = library();
        for name in ["Zeta", "Alpha", "Mid"] {
            lib.add(NewNotebook::new(URL, name)).unwrap();
        }
        let ids: Vec<&str> = lib.list().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn search_scenario() {
        let (_dir, mut lib) = library();
        lib.add(project_docs()).unwrap();

        let hits = lib.search("api");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "project-docs");
        assert!(lib.search("nonexistent").is_empty());
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let (_dir, mut lib) = library();
        lib.add(project_docs()).unwrap();
        lib.add(
            NewNotebook::new(URL, "Recipes")
                .description("Grandma's COOKING notes")
                .topics_csv("Food"),
        )
        .unwrap();

        assert_eq!(lib.search("PROJECT")[0].id, "project-docs");
        assert_eq!(lib.search("cooking")[0].id, "recipes");
        assert_eq!(lib.search("fOo")[0].id, "recipes");
        assert_eq!(lib.search("ARCHITECT").len(), 1);
    }

    #[test]
    fn activation_is_exclusive() {
        let (_dir, mut lib) = library();
        for name in ["One", "Two", "Three"] {
            lib.add(NewNotebook::new(URL, name)).unwrap();
            assert!(active_count(&lib) <= 1);
        }
        for id in ["one", "two", "three", "two"] {
            lib.activate(id).unwrap();
            assert_eq!(active_count(&lib), 1);
            assert_eq!(lib.get_active().unwrap().id, id);
        }
    }

    #[test]
    fn activate_missing_is_not_found() {
        let (_dir, mut lib) = library();
        lib.add(project_docs()).unwrap();
        lib.activate("project-docs").unwrap();
        assert!(matches!(lib.activate("nope"), Err(Error::NotFound(_))));
        assert_eq!(lib.get_active().unwrap().id, "project-docs");
    }

    #[test]
    fn remove_active_leaves_none_active() {
        let (dir, mut lib) = library();
        lib.add(project_docs()).unwrap();
        lib.add(NewNotebook::new(URL, "Other")).unwrap();
        lib.activate("project-docs").unwrap();

        let removed = lib.remove("project-docs").unwrap();
        assert_eq!(removed.id, "project-docs");
        assert!(matches!(lib.get_active(), Err(Error::NoneActive)));
        assert_eq!(active_count(&lib), 0);

        let reopened = Library::open(dir.path().join("library.json")).unwrap();
        assert!(matches!(reopened.get_active(), Err(Error::NoneActive)));
    }

    #[test]
    fn remove_inactive_keeps_active() {
        let (_dir, mut lib) = library();
        lib.add(project_docs()).unwrap();
        lib.add(NewNotebook::new(URL, "Other")).unwrap();
        lib.activate("project-docs").unwrap();
        lib.remove("other").unwrap();
        assert_eq!(lib.get_active().unwrap().id, "project-docs");
        assert!(matches!(lib.remove("other"), Err(Error::NotFound(_))));
    }

    #[test]
    fn get_active_on_empty_library() {
        let (_dir, lib) = library();
        assert!(matches!(lib.get_active(), Err(Error::NoneActive)));
    }

    #[test]
    fn touch_updates_usage() {
        let (_dir, mut lib) = library();
        lib.add(project_docs()).unwrap();
        let before = Utc::now();
        lib.touch("project-docs").unwrap();
        let entry = lib.touch("project-docs").unwrap();
        assert_eq!(entry.use_count, 2);
        assert!(entry.last_used_at.unwrap() >= before);
        assert!(matches!(lib.touch("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn active_pointer_survives_reopen() {
        let (dir, mut lib) = library();
        lib.add(project_docs()).unwrap();
        lib.activate("project-docs").unwrap();
        drop(lib);

        let reopened = Library::open(dir.path().join("library.json")).unwrap();
        assert_eq!(reopened.get_active().unwrap().id, "project-docs");
        assert_eq!(active_count(&reopened), 1);
    }

    #[test]
    fn open_repairs_inconsistent_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        let json = serde_json::json!({
            "notebooks": [
                {"id": "a", "url": URL, "name": "A", "created_at": "2025-01-01T00:00:00Z", "is_active": true},
                {"id": "b", "url": URL, "name": "B", "created_at": "2025-01-01T00:00:00Z", "is_active": true}
            ],
            "active_notebook_id": "b"
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let lib = Library::open(&path).unwrap();
        assert_eq!(active_count(&lib), 1);
        assert_eq!(lib.get_active().unwrap().id, "b");
    }

    #[test]
    fn open_drops_dangling_active_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        std::fs::write(
            &path,
            r#"{"notebooks": [], "active_notebook_id": "ghost"}"#,
        )
        .unwrap();
        let lib = Library::open(&path).unwrap();
        assert!(matches!(lib.get_active(), Err(Error::NoneActive)));
    }

    #[test]
    fn failed_write_leaves_snapshot_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // The document path is a directory, so every write fails.
        let path = dir.path().join("library.json");
        std::fs::create_dir(&path).unwrap();
        let mut lib = Library {
            path,
            doc: Document::default(),
        };
        assert!(matches!(lib.add(project_docs()), Err(Error::Io(_))));
        assert!(lib.list().is_empty());
    }

    #[test]
    fn long_lived_instance_keeps_concurrent_additions() {
        let (dir, mut setup) = library();
        setup
            .add(NewNotebook::new(URL, "A"))
            .unwrap();

        let path = dir.path().join("library.json");
        let mut asking = Library::open(&path).unwrap();
        let mut other = Library::open(&path).unwrap();
        other.add(NewNotebook::new(URL, "B")).unwrap();

        let touched = asking.touch("a").unwrap();
        assert_eq!(touched.use_count, 1);

        let ids: Vec<String> = Library::open(&path)
            .unwrap()
            .list()
            .iter()
            .map(|n| n.id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn removal_elsewhere_is_seen_before_activate() {
        let (dir, mut first) = library();
        first.add(project_docs()).unwrap();

        let mut second = Library::open(dir.path().join("library.json")).unwrap();
        second.remove("project-docs").unwrap();

        assert!(matches!(first.activate("project-docs"), Err(Error::NotFound(_))));
        assert!(first.list().is_empty());
    }

    #[test]
    fn stats_summarize_library() {
        let (_dir, mut lib) = library();
        lib.add(project_docs()).unwrap();
        lib.add(NewNotebook::new(URL, "Other").topics_csv("api,ops"))
            .unwrap();
        lib.touch("other").unwrap();
        lib.touch("other").unwrap();
        lib.touch("project-docs").unwrap();
        lib.activate("project-docs").unwrap();

        let stats = lib.stats();
        assert_eq!(stats.total_notebooks, 2);
        assert_eq!(stats.total_topics, 3);
        assert_eq!(stats.total_uses, 3);
        assert_eq!(stats.active_notebook_id.as_deref(), Some("project-docs"));
        assert_eq!(stats.most_used.as_deref(), Some("other"));
    }
}
