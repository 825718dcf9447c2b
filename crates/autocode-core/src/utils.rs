//! Path helpers shared by storage, executor and watcher

/// Canonical workspace-relative form: `/` separators, no `.` segments,
/// no empty segments, no leading or trailing slash.
pub fn normalize_path(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent directory of a normalized path, `None` at the workspace root
pub fn parent_dir(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Editor language id for a file, by extension
pub fn language_for_path(path: &str) -> &'static str {
    let name = file_name(path);
    if name == "Dockerfile" {
        return "dockerfile";
    }
    if name == "Makefile" {
        return "makefile";
    }
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("ts") | Some("mts") | Some("cts") => "typescript",
        Some("tsx") => "typescriptreact",
        Some("js") | Some("mjs") | Some("cjs") => "javascript",
        Some("jsx") => "javascriptreact",
        Some("rs") => "rust",
        Some("py") => "python",
        Some("go") => "go",
        Some("java") => "java",
        Some("json") => "json",
        Some("md") | Some("markdown") => "markdown",
        Some("html") | Some("htm") => "html",
        Some("css") => "css",
        Some("scss") => "scss",
        Some("yaml") | Some("yml") => "yaml",
        Some("toml") => "toml",
        Some("sh") | Some("bash") => "shell",
        Some("sql") => "sql",
        Some("vue") => "vue",
        Some("svelte") => "svelte",
        _ => "plaintext",
    }
}
