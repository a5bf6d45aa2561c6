//! Synchronous "document replaced" notifications.

use crate::document::Document;
use std::sync::Arc;

/// Why the session's document was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeCause {
    /// A user intent, with its undo label.
    Perform(String),
    /// Undo of the named action.
    Undo(String),
    /// Redo of the named action.
    Redo(String),
    /// A document was opened or imported.
    Open,
    /// The auto-saved document was restored at startup.
    Restore,
}

/// Emitted once after every committed change to the session's document.
#[derive(Debug)]
pub struct DocumentChange<'a> {
    pub document: &'a Document,
    pub cause: ChangeCause,
    /// The background differs structurally from the previous document's.
    pub background_changed: bool,
}

/// Something that reacts to document replacement.
pub trait DocumentObserver: Send + Sync {
    fn document_replaced(&self, change: &DocumentChange<'_>);
}

impl<T: DocumentObserver + ?Sized> DocumentObserver for Arc<T> {
    fn document_replaced(&self, change: &DocumentChange<'_>) {
        (**self).document_replaced(change)
    }
}

/// Fan-out of document changes to subscribed observers, in subscription order.
#[derive(Default)]
pub struct EventBus {
    observers: Vec<Box<dyn DocumentObserver>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &format!("<{} observers>", self.observers.len()))
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe an observer to receive every change.
    pub fn subscribe(&mut self, observer: impl DocumentObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Deliver `change` to all observers.
    pub fn emit(&self, change: &DocumentChange<'_>) {
        for observer in &self.observers {
            observer.document_replaced(change);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
