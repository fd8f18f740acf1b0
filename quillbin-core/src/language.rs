//! Language names for stored content.
//!
//! Clients may name a language (any known alias, case-insensitive) or ask
//! for detection with `auto`/empty. Everything resolves to a canonical name;
//! unknown names and unrecognized content resolve to [`PLAINTEXT`].

/// Fallback language name.
pub const PLAINTEXT: &str = "plaintext";

/// Canonical name followed by accepted aliases.
const LANGUAGES: &[(&str, &[&str])] = &[
    ("Bash", &["bash", "sh", "shell", "zsh"]),
    ("C", &["c", "h"]),
    ("C++", &["c++", "cpp", "cc", "cxx", "hpp"]),
    ("CSS", &["css"]),
    ("Diff", &["diff", "patch", "udiff"]),
    ("Go", &["go", "golang"]),
    ("HTML", &["html", "htm", "xhtml"]),
    ("Java", &["java"]),
    ("JavaScript", &["javascript", "js", "node", "mjs"]),
    ("JSON", &["json"]),
    ("Markdown", &["markdown", "md"]),
    ("Python", &["python", "py", "python3"]),
    ("Rust", &["rust", "rs"]),
    ("SQL", &["sql"]),
    ("TOML", &["toml"]),
    ("TypeScript", &["typescript", "ts"]),
    ("XML", &["xml"]),
    ("YAML", &["yaml", "yml"]),
    (PLAINTEXT, &["plaintext", "text", "txt", "plain"]),
];

/// Resolve a client-supplied language against `content`.
pub fn resolve_language(requested: Option<&str>, content: &str) -> String {
    match requested.map(str::trim) {
        None | Some("") => detect(content).to_string(),
        Some(name) if name.eq_ignore_ascii_case("auto") => detect(content).to_string(),
        Some(name) => lookup(name).unwrap_or(PLAINTEXT).to_string(),
    }
}

/// Canonical name for a language or alias.
pub fn lookup(name: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(canonical, aliases)| {
            canonical.eq_ignore_ascii_case(name) || aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
        })
        .map(|(canonical, _)| *canonical)
}

/// Canonical names of every known language.
pub fn names() -> impl Iterator<Item = &'static str> {
    LANGUAGES.iter().map(|(canonical, _)| *canonical)
}

/// Best-effort guess from content.
pub fn detect(content: &str) -> &'static str {
    let trimmed = content.trim_start();
    let first_line = trimmed.lines().next().unwrap_or_default();

    if let Some(interpreter) = first_line.strip_prefix("#!") {
        return detect_shebang(interpreter);
    }

    let head = trimmed.get(..trimmed.len().min(256)).unwrap_or(trimmed);
    let head_lower = head.to_ascii_lowercase();
    if head_lower.starts_with("<?xml") {
        return "XML";
    }
    if head_lower.starts_with("<!doctype html") || head_lower.starts_with("<html") {
        return "HTML";
    }
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return "JSON";
    }
    if trimmed.starts_with("diff --git") || (trimmed.starts_with("--- ") && content.contains("\n+++ ")) {
        return "Diff";
    }
    if content.contains("fn main(")
        || content.contains("use std::")
        || (content.contains("impl ") && content.contains("fn "))
    {
        return "Rust";
    }
    if trimmed.starts_with("package ") && content.contains("func ") {
        return "Go";
    }
    if content.contains("#include") {
        return if content.contains("std::") || content.contains("class ") {
            "C++"
        } else {
            "C"
        };
    }
    if content.contains("public static void main") || content.contains("public class ") {
        return "Java";
    }
    if has_line_starting(content, &["def ", "import ", "from "]) && content.contains(':') && !content.contains(';') {
        return "Python";
    }
    if has_line_starting(content, &["const ", "let ", "function ", "export "]) {
        return "JavaScript";
    }
    if has_line_starting(content, &["select ", "insert into ", "create table "]) {
        return "SQL";
    }
    if has_line_starting(content, &["# ", "## "]) {
        return "Markdown";
    }

    PLAINTEXT
}

fn detect_shebang(interpreter: &str) -> &'static str {
    let interpreter = interpreter.trim();
    if interpreter.contains("python") {
        "Python"
    } else if interpreter.contains("node") {
        "JavaScript"
    } else if ["bash", "/sh", "zsh", "env sh"].iter().any(|s| interpreter.contains(s)) {
        "Bash"
    } else {
        PLAINTEXT
    }
}

fn has_line_starting(content: &str, prefixes: &[&str]) -> bool {
    content.lines().any(|line| {
        let line = line.trim_start().to_ascii_lowercase();
        prefixes.iter().any(|p| line.starts_with(p))
    })
}
