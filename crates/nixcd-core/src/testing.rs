//! Scripted [`CommandRunner`] for tests.
//!
//! Replies are matched by substring against the rendered command line.
//! One-shot replies (`once`) are consumed in registration order and take
//! precedence over persistent ones (`on`). Unmatched commands succeed with
//! empty output. Every call is recorded.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{DeployError, Result};
use crate::runner::{CommandLine, CommandRunner};

#[derive(Debug, Clone)]
pub enum Reply {
    Stdout(String),
    Fail { code: i32, stderr: String },
}

impl Reply {
    pub fn stdout(text: impl Into<String>) -> Self {
        Reply::Stdout(text.into())
    }

    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Reply::Fail {
            code,
            stderr: stderr.into(),
        }
    }
}

#[derive(Default)]
pub struct ScriptedRunner {
    once: Mutex<Vec<(String, Reply)>>,
    persistent: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<CommandLine>>,
    hold: Option<(String, Arc<Semaphore>)>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every command containing `pattern`.
    pub fn on(self, pattern: impl Into<String>, reply: Reply) -> Self {
        self.persistent
            .lock()
            .expect("scripted runner lock")
            .push((pattern.into(), reply));
        self
    }

    /// Reply to the next command containing `pattern`, then forget the reply.
    pub fn once(self, pattern: impl Into<String>, reply: Reply) -> Self {
        self.once
            .lock()
            .expect("scripted runner lock")
            .push((pattern.into(), reply));
        self
    }

    /// Commands containing `pattern` wait for a permit on the returned
    /// semaphore before replying. Permits are consumed.
    pub fn hold_on(mut self, pattern: impl Into<String>) -> (Self, Arc<Semaphore>) {
        let semaphore = Arc::new(Semaphore::new(0));
        self.hold = Some((pattern.into(), semaphore.clone()));
        (self, semaphore)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("scripted runner lock")
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Number of recorded calls whose command line contains `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    async fn reply(&self, cmd: &CommandLine) -> Result<Vec<u8>> {
        let line = cmd.to_string();
        self.calls
            .lock()
            .expect("scripted runner lock")
            .push(cmd.clone());

        if let Some((pattern, semaphore)) = &self.hold {
            if line.contains(pattern.as_str()) {
                let permit = semaphore.acquire().await.expect("hold semaphore closed");
                permit.forget();
            }
        }

        let reply = {
            let mut once = self.once.lock().expect("scripted runner lock");
            match once.iter().position(|(p, _)| line.contains(p.as_str())) {
                Some(idx) => Some(once.remove(idx).1),
                None => self
                    .persistent
                    .lock()
                    .expect("scripted runner lock")
                    .iter()
                    .find(|(p, _)| line.contains(p.as_str()))
                    .map(|(_, r)| r.clone()),
            }
        };

        match reply {
            None => Ok(Vec::new()),
            Some(Reply::Stdout(text)) => Ok(text.into_bytes()),
            Some(Reply::Fail { code, stderr }) => Err(DeployError::ToolFailed {
                command: line,
                code: Some(code),
                stderr,
            }),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn output(&self, cmd: &CommandLine) -> Result<Vec<u8>> {
        self.reply(cmd).await
    }

    async fn stream(&self, cmd: &CommandLine) -> Result<()> {
        self.reply(cmd).await.map(|_| ())
    }
}
