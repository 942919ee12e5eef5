//! Conversation threads and their storage.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use relay_agent_actor::{Actor, Message as ActorMessage, Query};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Identifies a conversation thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Returns the key as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ThreadId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ThreadId {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<u64> for ThreadId {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Storage of conversation threads.
///
/// Appends to one thread are applied one at a time in arrival order, and a
/// batch from [`ConversationStore::append_all`] is never interleaved with
/// another writer's messages. Threads are created on first append and are
/// never removed.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends messages to the thread as one batch.
    async fn append_all(&self, thread_id: &ThreadId, messages: Vec<Message>);

    /// Returns the whole history of the thread, or nothing for an unknown
    /// thread.
    async fn read(&self, thread_id: &ThreadId) -> Vec<Message>;

    /// Appends a single message to the thread.
    async fn append(&self, thread_id: &ThreadId, message: Message) {
        self.append_all(thread_id, vec![message]).await
    }
}

struct ThreadLog {
    messages: Vec<Message>,
}

#[derive(Debug)]
struct AppendMessages(Vec<Message>);

impl ActorMessage<ThreadLog> for AppendMessages {
    #[inline]
    fn handle(self, state: &mut ThreadLog, _handle: &Actor<ThreadLog>) {
        state.messages.extend(self.0);
    }
}

#[derive(Debug)]
struct ReadMessages;

impl Query<ThreadLog> for ReadMessages {
    type Output = Vec<Message>;

    #[inline]
    fn handle(self, state: &mut ThreadLog) -> Vec<Message> {
        state.messages.clone()
    }
}

/// A [`ConversationStore`] that keeps threads in memory.
///
/// Every thread is owned by its own actor, which makes it the single
/// writer of that thread. Threads don't block each other.
#[derive(Default)]
pub struct InMemoryStore {
    threads: Mutex<HashMap<ThreadId, Actor<ThreadLog>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifiers of all threads, in no particular order.
    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.lock().keys().cloned().collect()
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ThreadId, Actor<ThreadLog>>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn thread(&self, thread_id: &ThreadId) -> Option<Actor<ThreadLog>> {
        self.lock().get(thread_id).cloned()
    }

    fn thread_or_insert(&self, thread_id: &ThreadId) -> Actor<ThreadLog> {
        self.lock()
            .entry(thread_id.clone())
            .or_insert_with(|| {
                debug!("creating thread {thread_id}");
                Actor::spawn(
                    ThreadLog {
                        messages: Vec::new(),
                    },
                    Some(thread_id.as_str()),
                )
            })
            .clone()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn append_all(&self, thread_id: &ThreadId, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        trace!("appending {} message(s) to {thread_id}", messages.len());
        self.thread_or_insert(thread_id)
            .send(AppendMessages(messages))
            .expect("thread actor has been dropped too early");
    }

    async fn read(&self, thread_id: &ThreadId) -> Vec<Message> {
        let Some(thread) = self.thread(thread_id) else {
            return Vec::new();
        };
        thread
            .ask(ReadMessages)
            .await
            .expect("thread actor has been dropped too early")
    }
}
