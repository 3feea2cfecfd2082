//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify the layering rules hold:
//! `domain` depends on nothing above it, `application` never reaches into
//! `infra`, and `infra` never calls services.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Read a file and strip comment lines to avoid false positives.
fn read_non_comment_lines(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| {
            let trimmed = l.trim();
            !trimmed.starts_with("//") && !trimmed.starts_with("/*") && !trimmed.starts_with('*')
        })
        .map(String::from)
        .collect()
}

fn layer_dir(layer: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src").join(layer)
}

/// Every `file:line` in `layer` whose code contains one of `forbidden`.
fn violations(layer: &str, forbidden: &[&str]) -> Vec<String> {
    let mut found = Vec::new();
    for file in collect_rs_files(&layer_dir(layer)) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            if forbidden.iter().any(|f| line.contains(f)) {
                found.push(format!("{rel}:{}: {line}", i + 1));
            }
        }
    }
    found
}

#[test]
fn domain_has_no_imports_from_outer_layers() {
    let found = violations(
        "domain",
        &["crate::application", "crate::infra", "tokio::", "reqwest", "fred::", "aws_sdk"],
    );
    assert!(
        found.is_empty(),
        "domain/ must stay pure:\n{}",
        found.join("\n")
    );
}

#[test]
fn application_has_no_infra_imports() {
    let found = violations(
        "application",
        &["crate::infra", "reqwest", "fred::", "aws_sdk", "aws_config"],
    );
    assert!(
        found.is_empty(),
        "application/ must reach infrastructure through ports:\n{}",
        found.join("\n")
    );
}

#[test]
fn infra_does_not_call_services() {
    let found = violations("infra", &["crate::application::services"]);
    assert!(
        found.is_empty(),
        "infra/ implements ports only:\n{}",
        found.join("\n")
    );
}

#[test]
fn no_print_macros_in_library_code() {
    let mut found = Vec::new();
    for layer in ["domain", "application", "infra"] {
        found.extend(violations(layer, &["println!", "eprintln!", "dbg!"]));
    }
    assert!(
        found.is_empty(),
        "use tracing instead of printing:\n{}",
        found.join("\n")
    );
}
