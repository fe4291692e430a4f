//! Scripted backend for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::{CompletionRequest, LanguageModel};
use crate::error::GatewayError;

/// Replies are queued per task; the last reply for a task repeats forever.
/// A task with no script fails with a transport error.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<HashMap<&'static str, VecDeque<Result<String, GatewayError>>>>,
    delays: HashMap<&'static str, Duration>,
    delay: Option<Duration>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, task: &'static str, response: Result<String, GatewayError>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(task).or_default().push_back(response);
        }
        self
    }

    pub fn reply(self, task: &'static str, text: impl Into<String>) -> Self {
        self.push(task, Ok(text.into()))
    }

    pub fn fail(self, task: &'static str, error: GatewayError) -> Self {
        self.push(task, Err(error))
    }

    /// Sleep before answering any task
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep before answering one task
    pub fn with_task_delay(mut self, task: &'static str, delay: Duration) -> Self {
        self.delays.insert(task, delay);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, task: &str) -> usize {
        self.calls().iter().filter(|c| c.task == task).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        if let Some(delay) = self.delays.get(request.task).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }

        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| GatewayError::Transport("script lock poisoned".into()))?;
        match scripts.get_mut(request.task) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Transport("empty script".into()))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(GatewayError::Transport("empty script".into()))),
            None => Err(GatewayError::Transport(format!(
                "no script for task '{}'",
                request.task
            ))),
        }
    }
}
