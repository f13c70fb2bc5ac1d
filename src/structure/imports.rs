use super::scanner::{source_files, ScanOptions};
use super::StructureWarning;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Node.js core modules, importable without a dependency entry.
const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls",
    "trace_events", "tty", "url", "util", "v8", "vm", "wasi", "worker_threads", "zlib",
];

/// `import … from 'x'`, `import 'x'`, `export … from 'x'`, `require('x')`, `import('x')`
const IMPORT_PATTERN: &str = r#"(?m)(?:^\s*import\s+(?:[\w*$\s{},]*?\s+from\s+)?['"]([^'"]+)['"])|(?:^\s*export\s+[\w*$\s{},]*?\s+from\s+['"]([^'"]+)['"])|(?:\brequire\(\s*['"]([^'"]+)['"]\s*\))|(?:\bimport\(\s*['"]([^'"]+)['"]\s*\))"#;

/// Package names declared in `root/package.json`.
///
/// Covers `dependencies`, `devDependencies` and `peerDependencies`, plus the
/// package's own `name`.
pub fn known_dependencies(root: &Path) -> Result<BTreeSet<String>, String> {
    let path = root.join("package.json");
    let content = fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let manifest: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

    let mut known = BTreeSet::new();
    if let Some(name) = manifest.get("name").and_then(|v| v.as_str()) {
        known.insert(name.to_string());
    }
    for section in ["dependencies", "devDependencies", "peerDependencies"] {
        if let Some(deps) = manifest.get(section).and_then(|v| v.as_object()) {
            known.extend(deps.keys().cloned());
        }
    }
    Ok(known)
}

/// Map an import specifier to the package it names.
///
/// `None` for relative paths, aliases, URL-ish schemes and Node builtins.
pub fn package_name(specifier: &str) -> Option<String> {
    if specifier.is_empty()
        || specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with("@/")
        || specifier.starts_with("~/")
        || specifier.contains(':')
    {
        return None;
    }

    let mut parts = specifier.split('/');
    let first = parts.next()?;
    let name = if first.starts_with('@') {
        let second = parts.next().filter(|s| !s.is_empty())?;
        format!("{}/{}", first, second)
    } else {
        first.to_string()
    };

    if NODE_BUILTINS.contains(&name.as_str()) {
        return None;
    }
    Some(name)
}

/// Every package specifier imported by `source`, in order of appearance.
pub fn imported_packages(pattern: &Regex, source: &str) -> Vec<String> {
    pattern
        .captures_iter(source)
        .filter_map(|caps| (1..=4).find_map(|i| caps.get(i)))
        .filter_map(|m| package_name(m.as_str()))
        .collect()
}

/// Flag imports of packages missing from `known`.
///
/// One warning per (file, package) pair, ordered by file then package.
pub fn scan_imports(
    root: &Path,
    known: &BTreeSet<String>,
    options: &ScanOptions,
) -> Result<Vec<StructureWarning>, String> {
    let pattern =
        Regex::new(IMPORT_PATTERN).map_err(|e| format!("Invalid import pattern: {}", e))?;

    let mut warnings = Vec::new();
    for file in source_files(root, options)? {
        let source = match fs::read_to_string(&file.absolute_path) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("Skipping unreadable file {}: {}", file.relative_path, e);
                continue;
            }
        };

        let unknown: BTreeSet<String> = imported_packages(&pattern, &source)
            .into_iter()
            .filter(|pkg| !known.contains(pkg))
            .collect();

        warnings.extend(unknown.into_iter().map(|package| StructureWarning::UnknownImport {
            file: file.relative_path.clone(),
            package,
        }));
    }

    Ok(warnings)
}
