//! A lightweight actor framework.
//!
//! Each actor runs as a tokio task that owns its state and processes
//! messages from an unbounded mailbox one by one. Use [`Message`] for
//! fire-and-forget updates and [`Query`] when a reply is needed.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod error;
mod handle;
mod mailbox;
mod scheduler;

pub use error::ActorDeadError;
pub use handle::Actor;
pub use mailbox::{Message, Query};

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: u32,
        history: Vec<u32>,
    }

    #[derive(Debug)]
    struct Add(u32);

    impl Message<Counter> for Add {
        fn handle(self, state: &mut Counter, _handle: &Actor<Counter>) {
            state.value += self.0;
            state.history.push(self.0);
        }
    }

    #[derive(Debug)]
    struct Get;

    impl Query<Counter> for Get {
        type Output = u32;

        fn handle(self, state: &mut Counter) -> u32 {
            state.value
        }
    }

    #[derive(Debug)]
    struct History;

    impl Query<Counter> for History {
        type Output = Vec<u32>;

        fn handle(self, state: &mut Counter) -> Vec<u32> {
            state.history.clone()
        }
    }

    #[tokio::test]
    async fn test_send_message() {
        let actor = Actor::spawn(Counter::default(), Some("counter"));
        actor.send(Add(40)).unwrap();
        actor.send(Add(2)).unwrap();
        assert_eq!(actor.ask(Get).await.unwrap(), 42);
        assert_eq!(actor.ask(History).await.unwrap(), vec![40, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_senders() {
        let actor = Actor::spawn(Counter::default(), None);
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let actor = actor.clone();
                tokio::spawn(async move {
                    for _ in 0..25 {
                        actor.send(Add(1)).unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(actor.ask(Get).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_killed_actor() {
        let actor = Actor::spawn(Counter::default(), None);
        actor.try_kill();
        // The kill signal is observed before further messages.
        let result = actor.ask(Get).await;
        assert_eq!(result, Err(ActorDeadError));
        assert!(actor.is_dead());
    }
}
