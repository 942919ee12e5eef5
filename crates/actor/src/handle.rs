use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::Instrument;

use crate::mailbox::{Mailbox, MailboxParts, QueryEnvelope};
use crate::scheduler::run_actor;
use crate::{ActorDeadError, Message, Query};

/// Handle to an actor.
///
/// The actor owns its state exclusively and handles one message at a
/// time, in the order they were sent. Cloning the handle is cheap, and the
/// actor stops once every handle has been dropped.
pub struct Actor<S> {
    mailbox: Arc<Mailbox<S>>,
}

impl<S: Send + 'static> Actor<S> {
    /// Spawns a new actor with the specified state and an optional label.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(state: S, label: Option<&str>) -> Self {
        let MailboxParts {
            mailbox,
            msg_rx,
            kill_rx,
        } = Mailbox::new();
        let mailbox = Arc::new(mailbox);
        tokio::spawn(
            run_actor(Arc::downgrade(&mailbox), state, msg_rx, kill_rx)
                .instrument(trace_span!("actor", label = label)),
        );
        Self { mailbox }
    }

    #[inline]
    pub(crate) fn from_mailbox(mailbox: Arc<Mailbox<S>>) -> Self {
        Self { mailbox }
    }

    /// Sends a message to the actor.
    #[inline]
    pub fn send<M: Message<S> + 'static>(
        &self,
        msg: M,
    ) -> Result<(), ActorDeadError> {
        self.mailbox.send(Box::new(msg))
    }

    /// Sends a query to the actor and waits for the reply.
    ///
    /// # Cancel safety
    ///
    /// The query is enqueued before the first suspension, so dropping the
    /// returned future only discards the reply, not the query itself.
    pub async fn ask<Q: Query<S>>(
        &self,
        query: Q,
    ) -> Result<Q::Output, ActorDeadError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(QueryEnvelope {
            query,
            reply_tx,
            _state: PhantomData,
        })?;
        reply_rx.await.map_err(|_| ActorDeadError)
    }

    /// Returns `true` if the actor no longer accepts messages.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Attempts to kill the actor.
    ///
    /// The actor is not guaranteed to be killed immediately, but it
    /// will stop handling further messages and quit soon.
    #[inline]
    pub fn try_kill(&self) {
        self.mailbox.try_kill();
    }
}

impl<S> Clone for Actor<S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}
