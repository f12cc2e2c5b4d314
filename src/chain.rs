use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::ChainError;
use crate::llm::CompletionClient;
use crate::template::PromptTemplate;
use crate::transcript::{Transcript, Turn};

/// Conversation runner: renders the template with the transcript so far,
/// asks the model, and remembers the exchange.
pub struct PromptChain {
    client: Arc<dyn CompletionClient>,
    template: PromptTemplate,
    transcript: Transcript,
}

impl PromptChain {
    pub fn new(client: Arc<dyn CompletionClient>, template: PromptTemplate) -> Self {
        Self {
            client,
            template,
            transcript: Transcript::new(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The prompt the next `respond(input)` would send.
    pub fn render(&self, input: &str) -> Result<String, ChainError> {
        self.template.render(&self.transcript.render(), input)
    }

    /// Sends `input` through the template and returns the reply without its role marker.
    ///
    /// A successful call appends exactly two turns; a failed one leaves the
    /// transcript as it was.
    #[instrument(skip(self, input), fields(model = self.client.model(), turns = self.transcript.len()))]
    pub async fn respond(&mut self, input: &str) -> Result<String, ChainError> {
        let prompt = self.render(input)?;
        debug!(prompt_len = prompt.len(), "Rendered prompt");

        let raw = self.client.complete(&prompt).await?;
        let reply = Turn::assistant_reply(&raw);
        let text = reply.text.clone();

        self.transcript.push(Turn::user(input));
        self.transcript.push(reply);
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Completion client that replays canned replies and records every prompt.
    #[derive(Default)]
    pub struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new<I, S>(replies: I) -> Arc<Self>
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn push_failure(&self, message: &str) {
            self.replies.lock().unwrap().push_back(Err(message.to_string()));
        }

        pub fn push_reply(&self, reply: &str) {
            self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, prompt: &str) -> Result<String, ChainError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(body)) => Err(ChainError::Api { status: 500, body }),
                None => Err(ChainError::EmptyReply),
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedClient;
    use super::*;
    use crate::transcript::Role;

    fn chain_with(client: Arc<ScriptedClient>) -> PromptChain {
        let template = PromptTemplate::new("{{ history }}\n---\n{{ input }}").unwrap();
        PromptChain::new(client, template)
    }

    #[tokio::test]
    async fn test_respond_strips_marker() {
        let client = ScriptedClient::new(["Assistant: OK"]);
        let mut chain = chain_with(client);

        assert_eq!(chain.respond("hi").await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_respond_appends_two_turns() {
        let client = ScriptedClient::new(["first", "Assistant: second"]);
        let mut chain = chain_with(client);

        chain.respond("one").await.unwrap();
        assert_eq!(chain.transcript().len(), 2);
        chain.respond("two").await.unwrap();
        assert_eq!(chain.transcript().len(), 4);

        let turns = chain.transcript().turns();
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "one");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[3].text, "second");
    }

    #[tokio::test]
    async fn test_same_input_renders_different_prompts() {
        let client = ScriptedClient::new(["Assistant: OK", "Assistant: OK"]);
        let mut chain = chain_with(client.clone());

        chain.respond("hi").await.unwrap();
        chain.respond("hi").await.unwrap();

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert_ne!(prompts[0], prompts[1]);
        assert_eq!(prompts[0], "\n---\nhi");
        assert_eq!(prompts[1], "Human: hi\nAssistant: OK\n---\nhi");
    }

    #[tokio::test]
    async fn test_failed_call_leaves_transcript_untouched() {
        let client = ScriptedClient::new(["Assistant: OK"]);
        client.push_failure("rate limited");
        let mut chain = chain_with(client);

        chain.respond("hi").await.unwrap();
        let err = chain.respond("again").await.unwrap_err();

        assert!(matches!(err, ChainError::Api { status: 500, .. }));
        assert_eq!(chain.transcript().len(), 2);
    }

    #[test]
    fn test_render_previews_next_prompt() {
        let chain = chain_with(ScriptedClient::new(Vec::<String>::new()));
        assert_eq!(chain.render("preview").unwrap(), "\n---\npreview");
        assert!(chain.transcript().is_empty());
    }
}
