use crate::ScanError;
use abr_core::project_label;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const LOG_FILE_EXTENSION: &str = "jsonl";

/// One log file and the project label it is counted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSource {
    pub project: String,
    pub path: PathBuf,
}

/// Lists `(project, file)` pairs below `root`.
///
/// Project directories are discovered up front; their log files are listed
/// lazily as the iterator advances. Hidden directories are skipped and only
/// `*.jsonl` files directly inside a project directory are yielded.
pub fn enumerate_sources(
    root: &Path,
) -> Result<impl Iterator<Item = LogSource>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }

    let mut projects = fs::read_dir(root)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .map(|name| !name.to_string_lossy().starts_with('.'))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    projects.sort();

    Ok(projects.into_iter().flat_map(|dir| {
        let project = dir
            .file_name()
            .map(|name| project_label(&name.to_string_lossy()))
            .unwrap_or_default();
        log_files(&dir)
            .into_iter()
            .map(move |path| LogSource {
                project: project.clone(),
                path,
            })
    }))
}

fn log_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "skipping unreadable project directory");
            return Vec::new();
        }
    };

    let mut files = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|extension| extension == LOG_FILE_EXTENSION)
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, "").expect("write file");
    }

    #[test]
    fn lists_jsonl_files_with_derived_labels() {
        let root = TempDir::new().expect("temp root");
        touch(&root.path().join("-Users-alice-myproject/b.jsonl"));
        touch(&root.path().join("-Users-alice-myproject/a.jsonl"));
        touch(&root.path().join("-Users-alice-myproject/notes.txt"));
        touch(&root.path().join("-Users-alice-myproject/nested/c.jsonl"));
        touch(&root.path().join("plain/d.jsonl"));
        touch(&root.path().join(".hidden/e.jsonl"));
        touch(&root.path().join("stray.jsonl"));

        let sources = enumerate_sources(root.path())
            .expect("root exists")
            .map(|source| {
                let file = source
                    .path
                    .file_name()
                    .expect("file name")
                    .to_string_lossy()
                    .to_string();
                (source.project, file)
            })
            .collect::<Vec<_>>();

        assert_eq!(
            sources,
            vec![
                ("myproject".to_string(), "a.jsonl".to_string()),
                ("myproject".to_string(), "b.jsonl".to_string()),
                ("plain".to_string(), "d.jsonl".to_string()),
            ]
        );
    }

    #[test]
    fn missing_root_is_reported() {
        let root = TempDir::new().expect("temp root");
        let missing = root.path().join("does-not-exist");
        match enumerate_sources(&missing) {
            Err(ScanError::MissingRoot(path)) => assert_eq!(path, missing),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected missing root"),
        }
    }
}
