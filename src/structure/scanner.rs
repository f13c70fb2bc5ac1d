use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file found while walking a project tree.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub absolute_path: PathBuf,
    /// Relative to the scan root, `/`-separated
    pub relative_path: String,
    /// Without the dot
    pub extension: String,
    pub size: u64,
}

/// Options for walking a project tree
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub max_depth: usize,
    pub follow_symlinks: bool,
    /// Skip entries whose name starts with a dot
    pub ignore_hidden: bool,
    /// Directory names skipped anywhere in the tree
    pub ignore_patterns: Vec<String>,
    /// Larger files are skipped with a warning
    pub max_file_size: u64,
    pub max_files: usize,
    /// Extensions (without dot) considered source code
    pub source_extensions: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_depth: 100,
            follow_symlinks: false,
            ignore_hidden: true,
            ignore_patterns: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                "target".to_string(),
                "dist".to_string(),
                "build".to_string(),
                "coverage".to_string(),
            ],
            max_file_size: 2 * 1024 * 1024, // 2 MB
            max_files: 10_000,
            source_extensions: ["js", "jsx", "ts", "tsx", "mjs", "cjs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ScanOptions {
    fn is_ignored(&self, name: &str) -> bool {
        (self.ignore_hidden && name.starts_with('.'))
            || self.ignore_patterns.iter().any(|p| p == name)
    }
}

fn relative(root: &Path, path: &Path) -> Result<String, String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|e| format!("Failed to strip prefix: {}", e))?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Walk `root` and return the source files under it, sorted by path.
pub fn source_files(root: &Path, options: &ScanOptions) -> Result<Vec<SourceFile>, String> {
    let mut files = Vec::new();
    let mut count = 0;

    let walker = WalkDir::new(root)
        .max_depth(options.max_depth)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        // Prune ignored directories instead of walking into them
        .filter_entry(|e| {
            e.depth() == 0 || !options.is_ignored(&e.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = entry.map_err(|e| format!("Failed to read directory entry: {}", e))?;

        count += 1;
        if count > options.max_files {
            return Err(format!("Too many files (limit: {})", options.max_files));
        }

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let extension = path
            .extension()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        if !options.source_extensions.iter().any(|e| *e == extension) {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|e| format!("Failed to read metadata: {}", e))?;
        if metadata.len() > options.max_file_size {
            log::warn!("Skipping large file: {:?} ({} bytes)", path, metadata.len());
            continue;
        }

        files.push(SourceFile {
            absolute_path: path.to_path_buf(),
            relative_path: relative(root, path)?,
            extension,
            size: metadata.len(),
        });
    }

    Ok(files)
}

/// One node of a directory snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Directory { name: String, children: Vec<TreeNode> },
    File { name: String, size: u64 },
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Directory { name, .. } | TreeNode::File { name, .. } => name,
        }
    }
}

/// Nested listing of `root`, directories and files sorted by name.
///
/// Ignored directories and hidden entries are left out.
pub fn snapshot(root: &Path, options: &ScanOptions) -> Result<Vec<TreeNode>, String> {
    let mut budget = options.max_files;
    walk_tree(root, options, 1, &mut budget)
}

fn walk_tree(
    dir: &Path,
    options: &ScanOptions,
    depth: usize,
    budget: &mut usize,
) -> Result<Vec<TreeNode>, String> {
    let read = fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {}: {}", dir.display(), e))?;

    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| format!("Failed to read directory entry: {}", e))?;
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.file_name());

    let mut nodes = Vec::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if options.is_ignored(&name) {
            continue;
        }

        if *budget == 0 {
            return Err(format!("Too many files (limit: {})", options.max_files));
        }
        *budget -= 1;

        let metadata = entry
            .metadata()
            .map_err(|e| format!("Failed to read metadata: {}", e))?;

        if metadata.is_dir() {
            let children = if depth < options.max_depth {
                walk_tree(&entry.path(), options, depth + 1, budget)?
            } else {
                Vec::new()
            };
            nodes.push(TreeNode::Directory { name, children });
        } else {
            nodes.push(TreeNode::File {
                name,
                size: metadata.len(),
            });
        }
    }

    Ok(nodes)
}
