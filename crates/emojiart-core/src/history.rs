//! Snapshot-based undo/redo.

use crate::document::Document;

/// Maximum number of undo frames to keep.
pub const MAX_UNDO_HISTORY: usize = 100;

/// A full document snapshot plus the label of the action that replaced it.
#[derive(Debug, Clone)]
pub struct UndoFrame {
    pub snapshot: Document,
    pub action: String,
}

/// Linear undo/redo history over whole-document snapshots.
///
/// Every mutation must go through [`History::perform`]; edits made to the
/// document behind its back are not undoable.
#[derive(Debug)]
pub struct History {
    undo_stack: Vec<UndoFrame>,
    redo_stack: Vec<UndoFrame>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self::with_limit(MAX_UNDO_HISTORY)
    }

    /// History that keeps at most `limit` undo frames (at least one).
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Apply `mutation` to `document`, recording the prior state under `action`.
    pub fn perform<R>(
        &mut self,
        document: &mut Document,
        action: impl Into<String>,
        mutation: impl FnOnce(&mut Document) -> R,
    ) -> R {
        let before = document.clone();
        let result = mutation(document);

        self.undo_stack.push(UndoFrame {
            snapshot: before,
            action: action.into(),
        });
        self.redo_stack.clear();

        if self.undo_stack.len() > self.limit {
            self.undo_stack.remove(0);
        }
        result
    }

    /// Restore the previous snapshot.
    /// Returns the undone action's name, or `None` if there was nothing to undo.
    pub fn undo(&mut self, document: &mut Document) -> Option<String> {
        let frame = self.undo_stack.pop()?;
        let current = std::mem::replace(document, frame.snapshot);
        self.redo_stack.push(UndoFrame {
            snapshot: current,
            action: frame.action.clone(),
        });
        Some(frame.action)
    }

    /// Re-apply the most recently undone action.
    pub fn redo(&mut self, document: &mut Document) -> Option<String> {
        let frame = self.redo_stack.pop()?;
        let current = std::mem::replace(document, frame.snapshot);
        self.undo_stack.push(UndoFrame {
            snapshot: current,
            action: frame.action.clone(),
        });
        Some(frame.action)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Menu label for the next undo, e.g. "Undo Move 🔥".
    pub fn undo_action_name(&self) -> Option<String> {
        self.undo_stack.last().map(|f| format!("Undo {}", f.action))
    }

    /// Menu label for the next redo.
    pub fn redo_action_name(&self) -> Option<String> {
        self.redo_stack.last().map(|f| format!("Redo {}", f.action))
    }

    /// The document as it was before the most recent undoable action.
    pub fn last_undo_snapshot(&self) -> Option<&Document> {
        self.undo_stack.last().map(|f| &f.snapshot)
    }

    /// The document as it was before the most recent undo.
    pub fn last_redo_snapshot(&self) -> Option<&Document> {
        self.redo_stack.last().map(|f| &f.snapshot)
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
