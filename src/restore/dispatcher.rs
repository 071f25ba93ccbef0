// grafanatool/src/restore/dispatcher.rs
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use super::registry::{ComponentKind, ComponentRegistry};
use super::selector::RestoreSelection;
use crate::config::Settings;

/// Result of replaying one extracted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub kind: ComponentKind,
    pub file_path: PathBuf,
    /// `None` on success, otherwise the rendered error chain.
    pub error: Option<String>,
}

impl RestoreOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub outcomes: Vec<RestoreOutcome>,
}

impl RestoreReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RestoreOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn print_summary(&self) {
        let failed = self.outcomes.len() - self.succeeded();
        println!(
            "Restore summary: {} attempted, {} succeeded, {} failed",
            self.outcomes.len(),
            self.succeeded(),
            failed
        );
        for outcome in self.failures() {
            eprintln!(
                "   ❌ {}: {}: {}",
                outcome.kind,
                outcome.file_path.display(),
                outcome.error.as_deref().unwrap_or_default()
            );
        }
    }
}

/// Replays every selected file through its kind's handler.
///
/// Kinds are processed in selection (registry) order, and all files of one kind finish before the
/// next kind starts. Within a kind up to `settings.restore_concurrency` handler calls run at once;
/// outcomes are still reported in file order. A handler that fails or panics is recorded and never
/// stops the run.
pub async fn dispatch(
    registry: &ComponentRegistry,
    selection: &RestoreSelection,
    settings: &Settings,
) -> RestoreReport {
    let mut report = RestoreReport::default();
    let concurrency = settings.restore_concurrency.max(1);

    for (kind, files) in selection.iter() {
        if files.is_empty() {
            continue;
        }
        let Some(handler) = registry.handler(kind) else {
            for file_path in files {
                eprintln!("❌ No handler registered for {}: {}", kind, file_path.display());
                report.outcomes.push(RestoreOutcome {
                    kind,
                    file_path: file_path.clone(),
                    error: Some(format!("no handler registered for {}", kind)),
                });
            }
            continue;
        };

        let component = kind.component_name();
        let outcomes: Vec<RestoreOutcome> = stream::iter(files)
            .map(|file_path| {
                let component = component.as_str();
                async move {
                    println!("restoring {}: {}", component, file_path.display());
                    let result = AssertUnwindSafe(handler.restore_one(file_path, settings))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(anyhow::anyhow!("handler panicked: {}", panic_message(&*panic)))
                        });
                    let error = match result {
                        Ok(()) => {
                            println!("✓ restored {}: {}", component, file_path.display());
                            None
                        }
                        Err(e) => {
                            eprintln!(
                                "❌ failed to restore {}: {}: {:#}",
                                component,
                                file_path.display(),
                                e
                            );
                            Some(format!("{:#}", e))
                        }
                    };
                    RestoreOutcome {
                        kind,
                        file_path: file_path.clone(),
                        error,
                    }
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        report.outcomes.extend(outcomes);
    }

    report
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}
