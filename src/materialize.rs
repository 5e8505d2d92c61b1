//! Project materializer: writes generated files into the scaffold.
//!
//! Entries are untrusted. A path is accepted only if, after normalisation,
//! it stays inside the project and lives under `src/` or `public/`.
//! Rejected, blank or unwritable entries are skipped, never fatal; only
//! disk-level errors such as a full volume or denied access fail the stage.

use std::io::ErrorKind;
use std::path::Path;

use crate::errors::{JobError, JobResult};
use crate::generate::GeneratedFile;
use crate::workspace::TITLE_PLACEHOLDER;

pub const ALLOWED_ROOTS: &[&str] = &["src", "public"];
pub const DEFAULT_SITE_TITLE: &str = "RoboSite";

/// Longest single path component most filesystems accept.
const MAX_COMPONENT_BYTES: usize = 255;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

/// Normalise a generated path to a relative `/`-separated form, or `None`
/// if it is empty, absolute, escapes the root or falls outside the allowed
/// namespaces.
pub fn normalize_generated_path(input: &str) -> Option<String> {
    let unified = input.trim().replace('\\', "/");
    if unified.is_empty() || unified.starts_with('/') || unified.contains('\0') {
        return None;
    }
    // Windows drive prefixes such as `C:`.
    if unified.len() >= 2 && unified.as_bytes()[1] == b':' {
        return None;
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other if other.len() > MAX_COMPONENT_BYTES => return None,
            other => parts.push(other),
        }
    }

    // A bare namespace directory is not a file.
    if parts.len() < 2 || !ALLOWED_ROOTS.contains(&parts[0]) {
        return None;
    }
    Some(parts.join("/"))
}

/// Write every acceptable entry under `project_dir`.
pub async fn materialize(project_dir: &Path, files: &[GeneratedFile]) -> JobResult<MaterializeReport> {
    let mut report = MaterializeReport::default();
    for file in files {
        let Some(rel) = normalize_generated_path(&file.path) else {
            tracing::debug!(path = %file.path, "skipping generated file outside allowed paths");
            report.skipped.push(file.path.clone());
            continue;
        };
        if file.content.trim().is_empty() {
            tracing::debug!(path = %rel, "skipping generated file with empty content");
            report.skipped.push(file.path.clone());
            continue;
        }

        let target = project_dir.join(&rel);
        match write_entry(&target, &file.content).await {
            Ok(()) => report.written.push(rel),
            Err(e) if is_entry_error(&e) => {
                tracing::warn!(path = %rel, error = %e, "skipping generated file that cannot be written");
                report.skipped.push(file.path.clone());
            }
            Err(e) => return Err(JobError::Materialize(format!("{}: {}", rel, e))),
        }
    }
    Ok(report)
}

async fn write_entry(target: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, content).await
}

/// Errors caused by the entry itself, such as a path colliding with an
/// earlier file or directory, rather than by the disk.
fn is_entry_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::AlreadyExists
            | ErrorKind::NotADirectory
            | ErrorKind::IsADirectory
            | ErrorKind::InvalidInput
    )
}

/// Title written into `index.html`: the generated title, else the client
/// id, else the default.
pub fn resolve_site_title<'a>(generated: Option<&'a str>, client_id: &'a str) -> &'a str {
    [generated.unwrap_or(""), client_id]
        .into_iter()
        .map(str::trim)
        .find(|t| !t.is_empty())
        .unwrap_or(DEFAULT_SITE_TITLE)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Replace the first title placeholder in `index.html`. Returns `false`
/// when the scaffold has no `index.html`.
pub async fn apply_site_title(project_dir: &Path, title: &str) -> JobResult<bool> {
    let index = project_dir.join("index.html");
    let html = match tokio::fs::read_to_string(&index).await {
        Ok(html) => html,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(JobError::Materialize(format!("index.html: {}", e))),
    };
    let next = html.replacen(TITLE_PLACEHOLDER, &escape_html(title), 1);
    tokio::fs::write(&index, next)
        .await
        .map_err(|e| JobError::Materialize(format!("index.html: {}", e)))?;
    Ok(true)
}
