use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::connector::Connector;
use crate::scheduler::{JobResult, SyncRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Incremental,
}

impl SyncMode {
    pub fn label(self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeReport {
    pub scope: String,
    pub count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub scopes: Vec<ScopeReport>,
    /// Error of the last failing connector; earlier ones are only logged.
    pub last_error: Option<String>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.last_error.is_none()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message} ({total} items synced)")]
pub struct SyncRunError {
    pub message: String,
    pub total: usize,
}

/// Runs every registered domain, in order, under one operation.
#[derive(Clone)]
pub struct MultiService {
    connectors: Vec<Arc<dyn Connector>>,
}

impl MultiService {
    pub fn new(connectors: Vec<Arc<dyn Connector>>) -> Self {
        Self { connectors }
    }

    pub fn scopes(&self) -> Vec<&str> {
        self.connectors.iter().map(|c| c.scope()).collect()
    }

    /// A failing connector does not stop the ones after it. Cancellation does.
    pub async fn run(&self, mode: SyncMode, cancel: &CancellationToken) -> SyncReport {
        let mut report = SyncReport::default();

        for connector in &self.connectors {
            if cancel.is_cancelled() {
                tracing::warn!(%mode, scope = connector.scope(), "sync cancelled, skipping remaining scopes");
                report.last_error = Some("cancelled".to_string());
                break;
            }

            let scope = connector.scope().to_string();
            let result = match mode {
                SyncMode::Full => connector.full_sync(cancel).await,
                SyncMode::Incremental => connector.incremental_sync(cancel).await,
            };

            let scope_report = match result {
                Ok(count) => ScopeReport {
                    scope,
                    count,
                    error: None,
                },
                Err(e) => {
                    tracing::error!(%mode, scope = %scope, error = %e, "scope sync failed");
                    let message = format!("{scope}: {e}");
                    report.last_error = Some(message.clone());
                    ScopeReport {
                        scope,
                        count: e.upserted(),
                        error: Some(message),
                    }
                }
            };

            report.total += scope_report.count;
            report.scopes.push(scope_report);
        }

        tracing::info!(%mode, total = report.total, success = report.is_success(), "sync run finished");
        report
    }
}

#[async_trait]
impl SyncRunner for MultiService {
    async fn run(&self, mode: SyncMode, cancel: CancellationToken) -> JobResult {
        let report = MultiService::run(self, mode, &cancel).await;
        match report.last_error {
            None => Ok(report.total),
            Some(message) => Err(Box::new(SyncRunError {
                message,
                total: report.total,
            })),
        }
    }
}
