use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

const BINARY_SAMPLE_BYTES: usize = 1024;

/// Filter rules applied during the repository walk.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Directory name segments that are never descended into.
    pub exclude_dirs: Vec<String>,
    /// Lower-cased extensions accepted for indexing.
    pub extensions: Vec<String>,
    /// Extensionless file names accepted verbatim.
    pub special_names: Vec<String>,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: [
                ".git",
                "vendor",
                "node_modules",
                "bin",
                ".venv",
                "__pycache__",
                "target",
            ]
            .map(String::from)
            .to_vec(),
            extensions: [
                "go", "mod", "md", "yaml", "yml", "json", "toml", "ts", "tsx", "css", "html",
                "rs", "py",
            ]
            .map(String::from)
            .to_vec(),
            special_names: ["Dockerfile"].map(String::from).to_vec(),
        }
    }
}

impl TraversalConfig {
    fn accepts(&self, path: &Path) -> bool {
        if let Some(name) = path.file_name().and_then(|n| n.to_str())
            && self.special_names.iter().any(|s| s == name)
        {
            return true;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }
}

/// Walk `root` and yield indexable source files.
///
/// Excluded directories are pruned without descending. Files passing the
/// name filter are additionally sniffed for binary content.
pub fn source_files<'a>(
    root: &Path,
    config: &'a TraversalConfig,
) -> impl Iterator<Item = PathBuf> + 'a {
    let exclude = config.exclude_dirs.clone();
    WalkBuilder::new(root)
        .standard_filters(false)
        .filter_entry(move |entry| {
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                let name = entry.file_name().to_string_lossy();
                return !exclude.iter().any(|d| *d == name);
            }
            true
        })
        .build()
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(ignore::DirEntry::into_path)
        .filter(move |path| config.accepts(path) && !is_binary(path))
}

/// Sniff the first bytes of a file for binary content.
///
/// A NUL byte anywhere in the sample, or more than 30% non-text control
/// bytes, marks the file as binary. Unreadable files are treated as binary
/// so the walk never fails.
#[must_use]
pub fn is_binary(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return true;
    };
    let mut sample = [0u8; BINARY_SAMPLE_BYTES];
    let Ok(n) = file.read(&mut sample) else {
        return true;
    };
    let sample = &sample[..n];
    if sample.contains(&0) {
        return true;
    }
    let control = sample
        .iter()
        .filter(|&&b| b < 9 || (14..32).contains(&b))
        .count();
    control * 10 > sample.len() * 3
}
