//! Chat transcript with optimistic sends.
//!
//! A send is two-phase: [`Transcript::begin_send`] appends a provisional user
//! message and hands back a [`PendingSend`]; the caller then either
//! [`Transcript::commit`]s it with the server reply or [`Transcript::revert`]s
//! it. Between the two the transcript refuses new submissions, so each
//! submission changes the transcript at most once in net terms: two entries
//! on success, none on failure.

use thiserror::Error;

use crate::api::ChatBackend;
use crate::error::DeepchatError;
use crate::models::{ChatReply, Message};

const PROVISIONAL_ID_PREFIX: &str = "temp-";

/// Why a submission was not sent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejected {
    #[error("message is empty")]
    Empty,

    #[error("a message is already being sent")]
    Busy,
}

/// Ticket for the one in-flight submission. Not `Clone`: it is consumed by
/// exactly one of `commit` or `revert`.
#[derive(Debug)]
#[must_use = "a pending send must be committed or reverted"]
pub struct PendingSend {
    provisional_id: String,
    query: String,
}

impl PendingSend {
    /// The trimmed text that will be sent.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn provisional_id(&self) -> &str {
        &self.provisional_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The assistant's reply, now the last message of the transcript.
    Replied(Message),
    Rejected(SubmitRejected),
}

#[derive(Debug, Clone)]
pub struct Transcript {
    session_id: String,
    messages: Vec<Message>,
    sending: bool,
}

impl Transcript {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_history(session_id, Vec::new())
    }

    /// Start from the server's message history, in conversation order.
    pub fn with_history(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            session_id: session_id.into(),
            messages,
            sending: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::models::Role::Assistant)
    }

    /// Phase one: append the provisional user message.
    pub fn begin_send(&mut self, input: &str) -> Result<PendingSend, SubmitRejected> {
        let query = input.trim();
        if query.is_empty() {
            return Err(SubmitRejected::Empty);
        }
        if self.sending {
            return Err(SubmitRejected::Busy);
        }

        let provisional_id = format!("{}{}", PROVISIONAL_ID_PREFIX, uuid::Uuid::new_v4());
        self.messages
            .push(Message::user(provisional_id.clone(), &self.session_id, query));
        self.sending = true;

        Ok(PendingSend {
            provisional_id,
            query: query.to_string(),
        })
    }

    /// Phase two, success: finalize the user message and append the reply.
    /// Returns the assistant message.
    pub fn commit(&mut self, pending: PendingSend, reply: ChatReply) -> &Message {
        let final_id = format!("user-{}", uuid::Uuid::new_v4());
        match self.position_of(&pending) {
            Some(idx) => self.messages[idx].id = final_id,
            None => {
                tracing::warn!(
                    provisional_id = %pending.provisional_id,
                    "Provisional message missing at commit, re-adding it"
                );
                self.messages
                    .push(Message::user(final_id, &self.session_id, pending.query));
            }
        }

        self.messages
            .push(Message::assistant(&self.session_id, reply));
        self.sending = false;
        &self.messages[self.messages.len() - 1]
    }

    /// Phase two, failure: drop the provisional message. The input text is
    /// not handed back.
    pub fn revert(&mut self, pending: PendingSend) {
        if let Some(idx) = self.position_of(&pending) {
            self.messages.remove(idx);
        }
        self.sending = false;
    }

    /// Full optimistic send against `backend`.
    pub async fn send(
        &mut self,
        backend: &dyn ChatBackend,
        input: &str,
    ) -> Result<SendOutcome, DeepchatError> {
        let pending = match self.begin_send(input) {
            Ok(p) => p,
            Err(reason) => return Ok(SendOutcome::Rejected(reason)),
        };

        match backend.send_message(&self.session_id, pending.query()).await {
            Ok(reply) => {
                let assistant = self.commit(pending, reply).clone();
                Ok(SendOutcome::Replied(assistant))
            }
            Err(e) => {
                tracing::debug!(session_id = %self.session_id, error = %e, "Send failed, rolling back");
                self.revert(pending);
                Err(e)
            }
        }
    }

    fn position_of(&self, pending: &PendingSend) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|m| m.id == pending.provisional_id)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that replies with a fixed answer.
    struct MockOkBackend {
        call_count: AtomicUsize,
    }

    impl MockOkBackend {
        fn new() -> Self {
            Self {
                call_count: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatBackend for MockOkBackend {
        async fn send_message(
            &self,
            _session_id: &str,
            user_query: &str,
        ) -> Result<ChatReply, DeepchatError> {
            let n = self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(ChatReply {
                response: format!("answer to {}", user_query),
                code: Some("df.head()".to_string()),
                code_explanation: None,
                file_url: None,
                message_id: format!("m-{}", n),
            })
        }
    }

    /// Backend that always fails with a server detail.
    struct MockErrBackend;

    #[async_trait]
    impl ChatBackend for MockErrBackend {
        async fn send_message(
            &self,
            _session_id: &str,
            _user_query: &str,
        ) -> Result<ChatReply, DeepchatError> {
            Err(DeepchatError::Api {
                status: 500,
                detail: Some("model overloaded".to_string()),
            })
        }
    }

    fn history() -> Vec<Message> {
        vec![Message::user("u-0", "s-1", "first question")]
    }

    #[test]
    fn test_begin_send_appends_one_provisional_entry() {
        let mut t = Transcript::with_history("s-1", history());
        let pending = t.begin_send("  how many rows?  ").unwrap();

        assert_eq!(t.len(), 2);
        assert!(t.is_sending());
        let last = t.messages().last().unwrap();
        assert_eq!(last.content, "how many rows?");
        assert_eq!(last.id, pending.provisional_id());
        assert!(last.id.starts_with(PROVISIONAL_ID_PREFIX));
        t.revert(pending);
    }

    #[test]
    fn test_second_submit_while_pending_is_noop() {
        let mut t = Transcript::new("s-1");
        let pending = t.begin_send("one").unwrap();
        let len = t.len();

        assert_eq!(t.begin_send("two").unwrap_err(), SubmitRejected::Busy);
        assert_eq!(t.len(), len);
        t.revert(pending);
    }

    #[test]
    fn test_blank_input_never_submitted() {
        let mut t = Transcript::new("s-1");
        assert_eq!(t.begin_send("").unwrap_err(), SubmitRejected::Empty);
        assert_eq!(t.begin_send(" \n\t ").unwrap_err(), SubmitRejected::Empty);
        assert!(t.is_empty());
        assert!(!t.is_sending());
    }

    #[test]
    fn test_commit_finalizes_and_appends_reply() {
        let mut t = Transcript::with_history("s-1", history());
        let pending = t.begin_send("plot revenue").unwrap();
        let provisional = pending.provisional_id().to_string();

        let reply = ChatReply {
            response: "Here is the chart".to_string(),
            code: Some("plt.plot(df.revenue)".to_string()),
            code_explanation: Some("Line chart".to_string()),
            file_url: Some("https://blob/chart.png".to_string()),
            message_id: "m-42".to_string(),
        };
        let assistant = t.commit(pending, reply).clone();

        assert_eq!(t.len(), 3);
        assert!(!t.is_sending());
        let user = &t.messages()[1];
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "plot revenue");
        assert_ne!(user.id, provisional);
        assert!(user.id.starts_with("user-"));
        assert_eq!(assistant.id, "m-42");
        assert_eq!(
            assistant.metadata.unwrap().file_url.as_deref(),
            Some("https://blob/chart.png")
        );
    }

    #[test]
    fn test_revert_restores_prior_transcript() {
        let mut t = Transcript::with_history("s-1", history());
        let before = t.messages().to_vec();
        let pending = t.begin_send("doomed").unwrap();
        t.revert(pending);

        assert_eq!(t.messages(), before.as_slice());
        assert!(!t.is_sending());
    }

    #[tokio::test]
    async fn test_send_success_nets_two_entries() {
        let backend = MockOkBackend::new();
        let mut t = Transcript::with_history("s-1", history());

        let outcome = t.send(&backend, "average price?").await.unwrap();
        match outcome {
            SendOutcome::Replied(msg) => {
                assert_eq!(msg.role, Role::Assistant);
                assert_eq!(msg.content, "answer to average price?");
            }
            other => panic!("Expected reply, got {:?}", other),
        }
        assert_eq!(t.len(), 3);
        assert_eq!(t.messages()[1].role, Role::User);
        assert_eq!(t.messages()[2].role, Role::Assistant);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_nets_zero_entries() {
        let mut t = Transcript::with_history("s-1", history());
        let err = t.send(&MockErrBackend, "average price?").await.unwrap_err();

        assert_eq!(err.user_message("Failed to send message"), "model overloaded");
        assert_eq!(t.len(), 1);
        assert!(!t.is_sending());
    }

    #[tokio::test]
    async fn test_send_blank_does_not_reach_backend() {
        let backend = MockOkBackend::new();
        let mut t = Transcript::new("s-1");
        let outcome = t.send(&backend, "   ").await.unwrap();

        assert_eq!(outcome, SendOutcome::Rejected(SubmitRejected::Empty));
        assert_eq!(backend.calls(), 0);
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn test_send_while_pending_does_not_reach_backend() {
        let backend = MockOkBackend::new();
        let mut t = Transcript::new("s-1");
        let pending = t.begin_send("first").unwrap();

        let outcome = t.send(&backend, "second").await.unwrap();
        assert_eq!(outcome, SendOutcome::Rejected(SubmitRejected::Busy));
        assert_eq!(backend.calls(), 0);
        assert_eq!(t.len(), 1);
        t.revert(pending);
    }

    #[tokio::test]
    async fn test_sequential_sends_keep_conversation_order() {
        let backend = MockOkBackend::new();
        let mut t = Transcript::new("s-1");
        t.send(&backend, "q1").await.unwrap();
        t.send(&backend, "q2").await.unwrap();

        let contents: Vec<&str> = t.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "answer to q1", "q2", "answer to q2"]);
        assert_eq!(t.last_assistant_message().unwrap().id, "m-1");
    }
}
