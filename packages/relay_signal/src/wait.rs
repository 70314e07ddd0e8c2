//! The future handed out by `Signal::wait()`.

use std::fmt;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::FusedFuture;

use crate::{Connection, Error, scheduler};

/// Resolves with the arguments of the next fire of a [`Signal`][crate::Signal].
///
/// Returned by [`Signal::wait()`][crate::Signal::wait]. Await it from async code or call
/// [`block()`][Self::block] from synchronous code.
///
/// Dropping a pending `Wait` disconnects it from the signal.
#[must_use = "futures do nothing unless polled"]
pub struct Wait<A> {
    state: WaitState<A>,
}

enum WaitState<A> {
    /// Subscribed and waiting for a fire.
    Pending {
        connection: Connection<A>,
        receiver: oneshot::Receiver<A>,
    },

    /// Resolved without ever subscribing.
    Failed(Error),

    Done,
}

impl<A> Wait<A> {
    pub(crate) fn pending(connection: Connection<A>, receiver: oneshot::Receiver<A>) -> Self {
        Self {
            state: WaitState::Pending {
                connection,
                receiver,
            },
        }
    }

    pub(crate) fn failed(error: Error) -> Self {
        Self {
            state: WaitState::Failed(error),
        }
    }

    /// Blocks the current thread until the wait resolves, running deferred calls meanwhile.
    ///
    /// # Errors
    ///
    /// The same outcomes as awaiting the wait, plus [`Error::UnsafeReentrantPoolUse`] if called
    /// from a subscriber that runs on a pooled execution context.
    pub fn block(self) -> Result<A, Error> {
        scheduler::block_on(self)?
    }
}

// No field is ever pinned; the receiver is polled through `Pin::new`.
impl<A> Unpin for Wait<A> {}

impl<A> Future for Wait<A> {
    type Output = Result<A, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match &mut this.state {
            WaitState::Pending { receiver, .. } => {
                let Poll::Ready(received) = Pin::new(receiver).poll(cx) else {
                    return Poll::Pending;
                };

                this.state = WaitState::Done;

                // The sender only goes away unused when the connection was dropped.
                Poll::Ready(received.map_err(|_| Error::WaitAbandoned))
            }
            WaitState::Failed(_) => {
                let WaitState::Failed(error) = mem::replace(&mut this.state, WaitState::Done)
                else {
                    unreachable!("state was just matched as Failed");
                };

                Poll::Ready(Err(error))
            }
            WaitState::Done => panic!("Wait polled after completion"),
        }
    }
}

impl<A> FusedFuture for Wait<A> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, WaitState::Done)
    }
}

impl<A> Drop for Wait<A> {
    fn drop(&mut self) {
        if let WaitState::Pending { connection, .. } = &self.state {
            connection.disconnect();
        }
    }
}

impl<A> fmt::Debug for Wait<A> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            WaitState::Pending { .. } => "pending",
            WaitState::Failed(_) => "failed",
            WaitState::Done => "done",
        };

        f.debug_struct("Wait").field("state", &state).finish()
    }
}
