//! Gitignore-aware source discovery using the `ignore` crate.
//!
//! Only languages the bundled symbol provider understands are returned.
//! Results are sorted by relative path so that node insertion order (and
//! therefore batch boundaries) is reproducible between runs.

use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Ignore patterns every configuration starts from: VCS and tool state,
/// dependencies, build output, declaration files and minified bundles.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git/",
    ".carto/",
    "node_modules/",
    "dist/",
    "build/",
    "coverage/",
    "target/",
    "*.d.ts",
    "*.min.js",
];

/// Language detection from file extension.
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    match ext.to_lowercase().as_str() {
        "ts" | "mts" | "cts" => Some("typescript"),
        "tsx" => Some("tsx"),
        "js" | "mjs" | "cjs" | "jsx" => Some("javascript"),
        _ => None,
    }
}

/// Information about a scanned file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedFile {
    /// Relative path from scan root.
    pub path: String,

    /// Detected language.
    pub language: String,

    /// File size in bytes.
    pub size_bytes: u64,
}

/// Result of scanning a directory.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScanResult {
    /// Discovered files, sorted by path.
    pub files: Vec<ScannedFile>,

    /// Files skipped because of language or size.
    pub skipped_count: usize,

    /// Entries that could not be inspected.
    pub error_count: usize,

    /// Time taken for the scan in milliseconds.
    pub duration_ms: f64,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Options controlling what the scanner picks up.
#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    /// Extra glob patterns to ignore (on top of `.gitignore` and `.cartoignore`).
    pub ignore_patterns: Vec<String>,

    /// Files larger than this are skipped.
    pub max_file_size_bytes: Option<u64>,

    /// Follow symbolic links while walking.
    pub follow_symlinks: bool,
}

/// Scan a directory for source files.
pub fn scan_directory(root: &Path, options: &ScanOptions) -> Result<ScanResult, String> {
    let start = Instant::now();

    if !root.exists() {
        return Err(format!("Path does not exist: {}", root.display()));
    }

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .follow_links(options.follow_symlinks)
        .add_custom_ignore_filename(".cartoignore");

    if !options.ignore_patterns.is_empty() {
        let mut override_builder = ignore::overrides::OverrideBuilder::new(root);
        for pattern in &options.ignore_patterns {
            // The ! prefix turns an override glob into an ignore rule
            if let Err(e) = override_builder.add(&format!("!{}", pattern)) {
                tracing::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }
        match override_builder.build() {
            Ok(overrides) => {
                builder.overrides(overrides);
            }
            Err(e) => tracing::warn!("Failed to build ignore overrides: {}", e),
        }
    }

    let paths: Vec<_> = builder
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|entry| entry.into_path())
        .collect();

    let skipped = AtomicUsize::new(0);
    let errors = AtomicUsize::new(0);

    let mut files: Vec<ScannedFile> = paths
        .par_iter()
        .filter_map(|path| {
            let Some(language) = detect_language(path) else {
                skipped.fetch_add(1, Ordering::Relaxed);
                return None;
            };

            let metadata = match fs::metadata(path) {
                Ok(m) => m,
                Err(_) => {
                    errors.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            };

            if let Some(max) = options.max_file_size_bytes {
                if metadata.len() > max {
                    skipped.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }

            let rel_path = path
                .strip_prefix(root)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_else(|_| path.to_string_lossy().to_string());

            Some(ScannedFile {
                path: rel_path,
                language: language.to_string(),
                size_bytes: metadata.len(),
            })
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ScanResult {
        files,
        skipped_count: skipped.load(Ordering::Relaxed),
        error_count: errors.load(Ordering::Relaxed),
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        File::create(dir.path().join("main.ts"))
            .unwrap()
            .write_all(b"export function main() {}\n")
            .unwrap();

        File::create(dir.path().join("legacy.js"))
            .unwrap()
            .write_all(b"function legacy() {}\n")
            .unwrap();

        File::create(dir.path().join("README.md"))
            .unwrap()
            .write_all(b"# Test\n")
            .unwrap();

        fs::create_dir(dir.path().join("src")).unwrap();
        File::create(dir.path().join("src/app.tsx"))
            .unwrap()
            .write_all(b"export const App = () => null;\n")
            .unwrap();

        fs::create_dir(dir.path().join("generated")).unwrap();
        File::create(dir.path().join("generated/api.ts"))
            .unwrap()
            .write_all(b"export const api = 1;\n")
            .unwrap();

        dir
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("a.ts")), Some("typescript"));
        assert_eq!(detect_language(Path::new("a.tsx")), Some("tsx"));
        assert_eq!(detect_language(Path::new("a.mjs")), Some("javascript"));
        assert_eq!(detect_language(Path::new("a.py")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
    }

    #[test]
    fn test_scan_directory_sorted_and_filtered() {
        let dir = create_test_dir();
        let result = scan_directory(dir.path(), &ScanOptions::default()).unwrap();

        let paths: Vec<&str> = result.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["generated/api.ts", "legacy.js", "main.ts", "src/app.tsx"]
        );
        assert_eq!(result.skipped_count, 1);
    }

    #[test]
    fn test_scan_directory_custom_ignore() {
        let dir = create_test_dir();
        let options = ScanOptions {
            ignore_patterns: vec!["generated/".to_string()],
            ..Default::default()
        };
        let result = scan_directory(dir.path(), &options).unwrap();

        assert!(result.files.iter().all(|f| !f.path.starts_with("generated")));
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_default_patterns_skip_declarations_and_bundles() {
        let dir = create_test_dir();
        fs::write(dir.path().join("types.d.ts"), "declare const x: number;").unwrap();
        fs::write(dir.path().join("vendor.min.js"), "var a=1;").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/lib")).unwrap();
        fs::write(dir.path().join("node_modules/lib/index.js"), "module.exports = 1;").unwrap();

        let options = ScanOptions {
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        };
        let result = scan_directory(dir.path(), &options).unwrap();

        let paths: Vec<&str> = result.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["generated/api.ts", "legacy.js", "main.ts", "src/app.tsx"]
        );
    }

    #[test]
    fn test_scan_directory_size_limit() {
        let dir = create_test_dir();
        let options = ScanOptions {
            max_file_size_bytes: Some(21),
            ..Default::default()
        };
        let result = scan_directory(dir.path(), &options).unwrap();

        // Only legacy.js (21 bytes) fits
        assert_eq!(result.len(), 1);
        assert_eq!(result.files[0].path, "legacy.js");
    }

    #[test]
    fn test_scan_missing_directory() {
        let result = scan_directory(Path::new("/definitely/not/here"), &ScanOptions::default());
        assert!(result.is_err());
    }
}
