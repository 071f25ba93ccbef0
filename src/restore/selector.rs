// grafanatool/src/restore/selector.rs
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::registry::{ComponentKind, ComponentRegistry};
use crate::errors::{RestoreError, Result};

/// Maps one `--components` token (`dashboards`, `alert-channels`, ...) to its kind.
///
/// Hyphens become underscores and a single trailing `s` is dropped, so the singular
/// form is accepted too. Returns `None` when the token names no kind.
pub fn normalize_component_name(token: &str) -> Option<ComponentKind> {
    let normalized = token.trim().to_ascii_lowercase().replace('-', "_");
    let singular = normalized.strip_suffix('s').unwrap_or(&normalized);
    ComponentKind::from_extension(singular)
}

/// Parses a comma-separated component list into the kinds it names, checked against `registry`.
///
/// Every unknown name is collected into a single `UnknownComponent` error. Blank tokens left by
/// stray commas are skipped and duplicates collapse.
pub fn parse_component_filter(
    list: &str,
    registry: &ComponentRegistry,
) -> Result<Vec<ComponentKind>> {
    let mut kinds = Vec::new();
    let mut unknown = Vec::new();

    for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match normalize_component_name(token).filter(|kind| registry.contains(*kind)) {
            Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
            Some(_) => {}
            None => unknown.push(token.to_string()),
        }
    }

    if !unknown.is_empty() {
        return Err(RestoreError::UnknownComponent {
            names: unknown,
            expected: registry
                .kinds()
                .map(ComponentKind::component_name)
                .collect::<Vec<_>>()
                .join(", "),
        });
    }
    Ok(kinds)
}

/// Files to replay, grouped per kind in registry order.
#[derive(Debug, Default)]
pub struct RestoreSelection {
    entries: Vec<(ComponentKind, Vec<PathBuf>)>,
}

impl RestoreSelection {
    pub fn iter(&self) -> impl Iterator<Item = (ComponentKind, &[PathBuf])> {
        self.entries
            .iter()
            .map(|(kind, files)| (*kind, files.as_slice()))
    }
}

/// Resolves the requested kinds (all registered kinds when `requested` is `None`) against the
/// files present under `workspace`. A requested kind with no files yields an empty list.
pub fn select(
    requested: Option<&[ComponentKind]>,
    registry: &ComponentRegistry,
    workspace: &Path,
) -> Result<RestoreSelection> {
    let mut entries = Vec::new();
    for kind in registry.kinds() {
        if requested.is_some_and(|wanted| !wanted.contains(&kind)) {
            continue;
        }
        entries.push((kind, find_target_files(workspace, kind)?));
    }
    Ok(RestoreSelection { entries })
}

/// Recursively lists regular files under `root` whose extension equals the kind's tag,
/// in lexicographic path order.
pub fn find_target_files(root: &Path, kind: ComponentKind) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            RestoreError::Selection(format!("Failed to walk directory {}: {}", root.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == kind.extension());
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
