pub(crate) mod api_checks;
pub(crate) mod client;

pub use client::GrafanaClient;
