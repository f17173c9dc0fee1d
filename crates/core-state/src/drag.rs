//! Drop gestures reported by the drag collaborator.

/// `(active, over)` pair delivered when a drag ends. `over` is `None` when
/// the item was dropped outside any sortable slot (a cancelled drag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragEnd {
    pub active: String,
    pub over: Option<String>,
}

impl DragEnd {
    pub fn new(active: impl Into<String>, over: Option<String>) -> Self {
        Self {
            active: active.into(),
            over,
        }
    }

    /// `(from, to)` for a drop that moves something, `None` otherwise.
    pub fn resolve(&self) -> Option<(&str, &str)> {
        match self.over.as_deref() {
            Some(over) if over != self.active => Some((self.active.as_str(), over)),
            _ => None,
        }
    }
}
