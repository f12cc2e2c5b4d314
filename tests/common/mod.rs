#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taskforge::{ChainError, CompletionClient};

/// Completion client double: replays queued replies and records every prompt it was sent.
#[derive(Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(self: &Arc<Self>, text: &str) -> Arc<Self> {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self.clone()
    }

    pub fn fail(self: &Arc<Self>, message: &str) -> Arc<Self> {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
        self.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    async fn complete(&self, prompt: &str) -> Result<String, ChainError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(body)) => Err(ChainError::Api { status: 503, body }),
            None => Err(ChainError::EmptyReply),
        }
    }

    fn model(&self) -> &str {
        "mock"
    }
}
