use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::traits::TextCompletion;
use tenderflow_core::types::{ChatMessage, Completion};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Fails with `LlmRequest`.
    RequestError(String),
    /// Never resolves; for timeout and cancellation tests.
    Hang,
}

/// Completion stub that replays a script, then falls back to a fixed reply.
pub struct ScriptedCompletion {
    model: String,
    script: Mutex<VecDeque<Reply>>,
    otherwise: Option<String>,
    calls: AtomicU32,
    received: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: Mutex::new(VecDeque::new()),
            otherwise: None,
            calls: AtomicU32::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// A stub that answers every call with `text`.
    pub fn always(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(model).otherwise(text)
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Reply::Text(text.into()))
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Reply::RequestError(message.into()))
    }

    pub fn hang(self) -> Self {
        self.push(Reply::Hang)
    }

    /// Reply used once the script is exhausted.
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.otherwise = Some(text.into());
        self
    }

    fn push(self, reply: Reply) -> Self {
        self.script.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every message list this stub was called with, in call order.
    pub fn received(&self) -> Vec<Vec<ChatMessage>> {
        self.received.lock().unwrap().clone()
    }
}

impl TextCompletion for ScriptedCompletion {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(messages);
        let next = self.script.lock().unwrap().pop_front();
        let reply = match next {
            Some(r) => r,
            None => match &self.otherwise {
                Some(text) => Reply::Text(text.clone()),
                None => Reply::RequestError("script exhausted".into()),
            },
        };

        Box::pin(async move {
            match reply {
                Reply::Text(text) => Ok(Completion::new(text, self.model.clone())),
                Reply::RequestError(msg) => Err(TenderError::LlmRequest(msg)),
                Reply::Hang => futures::future::pending().await,
            }
        })
    }
}

/// Fails the first `failures` calls with `LlmRequest`, then answers `text`.
pub struct FailingThenOk {
    failures: u32,
    text: String,
    calls: AtomicU32,
}

impl FailingThenOk {
    pub fn new(failures: u32, text: impl Into<String>) -> Self {
        Self {
            failures,
            text: text.into(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextCompletion for FailingThenOk {
    fn model_id(&self) -> &str {
        "failing-then-ok"
    }

    fn complete(&self, _messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if n < self.failures {
                Err(TenderError::LlmRequest(format!(
                    "HTTP 503 Service Unavailable (call {})",
                    n + 1
                )))
            } else {
                Ok(Completion::new(self.text.clone(), "failing-then-ok"))
            }
        })
    }
}
