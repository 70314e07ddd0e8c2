//! The singly-linked connection list embedded in every signal.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::Node;

/// Connections of one signal, newest first.
///
/// New connections are prepended, so traversal order is the reverse of connection order.
///
/// Traversals never hold a lock while user code runs. They snapshot the head and then follow
/// `next` links one node at a time, checking each node's own `connected` flag. Unlinking a
/// node leaves that node's `next` intact, so a traversal currently standing on it is not cut
/// off from the rest of the chain.
#[derive(Debug)]
pub(crate) struct ConnectionRegistry<A> {
    head: Mutex<Option<Arc<Node<A>>>>,
}

impl<A> ConnectionRegistry<A> {
    pub(crate) fn new() -> Self {
        Self {
            head: Mutex::new(None),
        }
    }

    pub(crate) fn prepend(&self, node: Arc<Node<A>>) {
        let mut head = self.head.lock();
        *node.next.lock() = head.take();
        *head = Some(node);
    }

    /// Removes `target` from the chain by pointing its predecessor past it.
    ///
    /// Returns `false` if the node was not found (already unlinked or detached).
    pub(crate) fn unlink(&self, target: &Arc<Node<A>>) -> bool {
        // Held for the entire walk so that unlinks and prepends are serialized.
        let mut head = self.head.lock();

        if head.as_ref().is_some_and(|first| Arc::ptr_eq(first, target)) {
            *head = target.next.lock().clone();
            return true;
        }

        let mut current = head.clone();

        while let Some(node) = current {
            let mut next = node.next.lock();

            if next.as_ref().is_some_and(|n| Arc::ptr_eq(n, target)) {
                *next = target.next.lock().clone();
                return true;
            }

            let following = next.clone();
            drop(next);
            current = following;
        }

        false
    }

    /// Detaches the entire chain, returning its first node.
    pub(crate) fn take_all(&self) -> Option<Arc<Node<A>>> {
        self.head.lock().take()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.lock().is_none()
    }

    /// Iterates over the chain as it is at the moment of the call, newest first.
    ///
    /// Nodes unlinked after the iterator passes them are still yielded if the iterator was
    /// already standing on them; callers must check each node's state before acting on it.
    pub(crate) fn iter(&self) -> Chain<A> {
        Chain::new(self.head.lock().clone())
    }
}

/// Walks a chain of nodes by following `next` links.
#[derive(Debug)]
pub(crate) struct Chain<A> {
    next: Option<Arc<Node<A>>>,
}

impl<A> Chain<A> {
    pub(crate) fn new(first: Option<Arc<Node<A>>>) -> Self {
        Self { next: first }
    }
}

impl<A> Iterator for Chain<A> {
    type Item = Arc<Node<A>>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.next.lock().clone();
        Some(current)
    }
}
