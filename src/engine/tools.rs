//! Path and pattern utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Convert absolute path to relative path from base
pub fn path_relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// Normalize a path to the portable form used as graph and DB key: forward slashes, no `./`, no trailing slash.
pub fn normalize_rel(path: &str) -> String {
    let s = path.replace('\\', "/");
    let s = s.trim_start_matches("./").trim_end_matches('/');
    let mut out = String::with_capacity(s.len());
    for part in s.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

/// Portable string form of a relative `Path` (forward slashes).
pub fn path_to_db_string(path: &Path) -> String {
    normalize_rel(&path.to_string_lossy())
}

/// True if `path` is `folder` itself or lies below it. Component-wise, so `folder1/x` is not under `folder`.
pub fn is_under_folder(path: &str, folder: &str) -> bool {
    if folder.is_empty() {
        return true;
    }
    match path.strip_prefix(folder) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Strip `root/` from a workspace path. Returns the remainder, or None when not below `root`.
pub fn strip_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    path.strip_prefix(root)?.strip_prefix('/')
}

/// Replace (or add) the extension of a relative path.
pub fn replace_extension(path: &str, extension: &str) -> String {
    let ext = extension.trim_start_matches('.');
    let (dir, name) = match path.rfind('/') {
        Some(i) => (&path[..=i], &path[i + 1..]),
        None => ("", path),
    };
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    };
    format!("{dir}{stem}.{ext}")
}

/// File name component of a relative path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Check if a file should be excluded based on OS-specific hidden files
pub fn is_os_hidden_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            // macOS
            ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
            // Windows
            "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" => true,
            // Linux
            ".directory" => true,
            _ => name.starts_with("._") || name.starts_with(".Trash-"),
        }
    } else {
        false
    }
}

/// Returns true if the path should be included in the scan (not excluded).
///
/// `skip` holds canonical paths never scanned (the checkpoint DB and its temp file).
pub fn should_include_in_walk(
    path: &Path,
    root: &Path,
    skip: &[PathBuf],
    exclude_patterns: &[String],
) -> bool {
    if path == root {
        return false;
    }
    if skip.iter().any(|s| path.starts_with(s)) {
        return false;
    }
    if is_os_hidden_file(path) {
        return false;
    }
    if exclude_patterns.is_empty() {
        return true;
    }
    // Any excluded folder above the entry excludes the entry too.
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel_str = path_to_db_string(rel);
    for pattern in exclude_patterns {
        if glob_match(pattern, &rel_str) {
            return false;
        }
        let hit = rel
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .any(|name| glob_match(pattern, name));
        if hit {
            return false;
        }
    }
    true
}

/// Simple glob pattern matching (supports * and ?)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    // Remove leading '!' if present (negation handled by caller)
    let pattern = pattern.strip_prefix('!').unwrap_or(pattern);
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_chars(&p, &t, false)
}

/// Case-insensitive glob used for builder patterns.
pub fn glob_match_icase(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_chars(&p, &t, true)
}

/// Iterative matcher with single-star backtracking.
fn glob_match_chars(p: &[char], t: &[char], icase: bool) -> bool {
    let eq = |a: char, b: char| {
        if icase {
            a.to_lowercase().eq(b.to_lowercase())
        } else {
            a == b
        }
    };
    let (mut pi, mut ti) = (0_usize, 0_usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || (p[pi] != '*' && eq(p[pi], t[ti]))) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

pub fn check_root_and_canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("canonicalize project root {}", path.display()))
}

/// Modification time of `meta` in nanoseconds since epoch (0 when unavailable).
pub fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_backtracks_past_partial_match() {
        assert!(glob_match("*ab", "aab"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
    }

    #[test]
    fn icase_compares_lowercase() {
        assert!(glob_match_icase("*.PNG", "textures/Wall.png"));
        assert!(!glob_match("*.PNG", "wall.png"));
    }

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize_rel("./a//b\\c/"), "a/b/c");
        assert_eq!(normalize_rel(""), "");
    }
}
