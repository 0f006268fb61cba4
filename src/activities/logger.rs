use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::repo::{Activity, ActivityRepo, NewActivity};

const PROMPT_SNIPPET_CHARS: usize = 100;

/// Writes audit entries. `spawn` is fire-and-forget and never reports back to the
/// caller; `record` is the awaited variant used by the explicit logging endpoint.
#[derive(Clone)]
pub struct ActivityLogger {
    repo: Arc<dyn ActivityRepo>,
}

impl ActivityLogger {
    pub fn new(repo: Arc<dyn ActivityRepo>) -> Self {
        Self { repo }
    }

    pub async fn record(&self, entry: NewActivity) -> anyhow::Result<Activity> {
        self.repo.insert(entry).await
    }

    pub fn spawn(&self, entry: NewActivity) -> JoinHandle<()> {
        let repo = self.repo.clone();
        tokio::spawn(async move {
            let user_id = entry.user_id;
            let action = entry.action;
            match repo.insert(entry).await {
                Ok(a) => debug!(activity_id = %a.id, %user_id, %action, "activity logged"),
                Err(e) => warn!(error = %e, %user_id, %action, "activity log write failed"),
            }
        })
    }
}

/// First characters of a prompt, for audit payloads.
pub fn prompt_snippet(prompt: &str) -> String {
    prompt.chars().take(PROMPT_SNIPPET_CHARS).collect()
}
