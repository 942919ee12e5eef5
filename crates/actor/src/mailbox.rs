use std::fmt::{self, Debug};
use std::marker::PhantomData;

use tokio::sync::{mpsc, oneshot, watch};

use crate::{Actor, ActorDeadError};

/// Helper trait for handling boxed messages.
pub trait BoxMessage<S>: Send + Debug + 'static {
    fn handle_box(self: Box<Self>, state: &mut S, handle: &Actor<S>);
}

/// A fire-and-forget message that an actor can handle.
pub trait Message<S>: BoxMessage<S> {
    /// Handles the message with mutable access to the actor's state.
    fn handle(self, state: &mut S, handle: &Actor<S>);
}

impl<S, M: Message<S>> BoxMessage<S> for M {
    #[inline]
    fn handle_box(self: Box<Self>, state: &mut S, handle: &Actor<S>) {
        (*self).handle(state, handle)
    }
}

impl<S, M: Message<S> + ?Sized> Message<S> for Box<M> {
    #[inline]
    fn handle(self, state: &mut S, handle: &Actor<S>) {
        self.handle_box(state, handle)
    }
}

/// A request that expects a reply from the actor.
///
/// Queries share the mailbox with ordinary messages, so a query observes
/// every message that was sent before it.
pub trait Query<S>: Send + Debug + 'static {
    /// The reply type.
    type Output: Send + 'static;

    /// Computes the reply with mutable access to the actor's state.
    fn handle(self, state: &mut S) -> Self::Output;
}

pub(crate) struct QueryEnvelope<S, Q: Query<S>> {
    pub query: Q,
    pub reply_tx: oneshot::Sender<Q::Output>,
    pub _state: PhantomData<fn(&mut S)>,
}

impl<S, Q: Query<S>> Debug for QueryEnvelope<S, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.query).finish()
    }
}

impl<S: 'static, Q: Query<S>> Message<S> for QueryEnvelope<S, Q> {
    #[inline]
    fn handle(self, state: &mut S, _handle: &Actor<S>) {
        let output = self.query.handle(state);
        // The asker may have given up waiting, that's fine.
        self.reply_tx.send(output).ok();
    }
}

pub struct MailboxParts<S> {
    pub mailbox: Mailbox<S>,
    pub msg_rx: mpsc::UnboundedReceiver<Box<dyn Message<S>>>,
    pub kill_rx: watch::Receiver<bool>,
}

pub struct Mailbox<S> {
    msg_tx: mpsc::UnboundedSender<Box<dyn Message<S>>>,
    kill_tx: watch::Sender<bool>,
}

impl<S: Send + 'static> Mailbox<S> {
    #[inline]
    pub fn new() -> MailboxParts<S> {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = watch::channel(false);
        MailboxParts {
            mailbox: Mailbox { msg_tx, kill_tx },
            msg_rx,
            kill_rx,
        }
    }

    #[inline]
    pub fn send(&self, msg: Box<dyn Message<S>>) -> Result<(), ActorDeadError> {
        self.msg_tx.send(msg).map_err(|_| ActorDeadError)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.msg_tx.is_closed()
    }

    #[inline]
    pub fn try_kill(&self) {
        self.kill_tx.send(true).ok();
    }
}
