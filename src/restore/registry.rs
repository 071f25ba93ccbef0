// grafanatool/src/restore/registry.rs
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;

/// One category of restorable object. The variant's extension is also the file extension the
/// backup writes for objects of that kind (`<name>.dashboard`, `<name>.alert_rule`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Folder,
    Datasource,
    LibraryElement,
    Dashboard,
    AlertChannel,
    AlertRule,
}

impl ComponentKind {
    /// Canonical restore order. Folders come before anything placed in a folder and library
    /// elements come before the dashboards that embed them.
    pub const RESTORE_ORDER: [ComponentKind; 6] = [
        ComponentKind::Folder,
        ComponentKind::Datasource,
        ComponentKind::LibraryElement,
        ComponentKind::Dashboard,
        ComponentKind::AlertChannel,
        ComponentKind::AlertRule,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ComponentKind::Folder => "folder",
            ComponentKind::Datasource => "datasource",
            ComponentKind::LibraryElement => "library_element",
            ComponentKind::Dashboard => "dashboard",
            ComponentKind::AlertChannel => "alert_channel",
            ComponentKind::AlertRule => "alert_rule",
        }
    }

    /// The plural, hyphenated name used on the command line, e.g. `alert-channels`.
    pub fn component_name(self) -> String {
        format!("{}s", self.extension().replace('_', "-"))
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::RESTORE_ORDER
            .into_iter()
            .find(|kind| kind.extension() == extension)
    }

    fn order_index(self) -> usize {
        Self::RESTORE_ORDER
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or(Self::RESTORE_ORDER.len())
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Restores a single serialized object from one extracted file.
#[async_trait]
pub trait RestoreHandler: Send + Sync {
    async fn restore_one(&self, file_path: &Path, settings: &Settings) -> anyhow::Result<()>;
}

/// Ordered `(kind, handler)` pairs. Iteration always follows `ComponentKind::RESTORE_ORDER`,
/// whatever order handlers were registered in, and each kind holds at most one handler.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    entries: Vec<(ComponentKind, Arc<dyn RestoreHandler>)>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any handler already registered for it.
    pub fn register(&mut self, kind: ComponentKind, handler: Arc<dyn RestoreHandler>) -> &mut Self {
        match self.entries.binary_search_by_key(&kind.order_index(), |(k, _)| k.order_index()) {
            Ok(pos) => self.entries[pos].1 = handler,
            Err(pos) => self.entries.insert(pos, (kind, handler)),
        }
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.entries.iter().map(|(kind, _)| *kind)
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.handler(kind).is_some()
    }

    pub fn handler(&self, kind: ComponentKind) -> Option<&Arc<dyn RestoreHandler>> {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, handler)| handler)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}
