//! Holding area for file events that arrive while the initial scan is running.

use std::collections::VecDeque;

use crate::types::FileEvent;

/// FIFO of deferred events. Replayed after the scan's reconcile events, in arrival order.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<FileEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: FileEvent) {
        self.events.push_back(event);
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&mut self) -> Vec<FileEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_keeps_arrival_order() {
        let mut q = EventQueue::new();
        q.push(FileEvent::Deleted { path: "b".into() });
        q.push(FileEvent::Deleted { path: "a".into() });
        q.push(FileEvent::FolderDeleted { path: "b".into() });
        let paths: Vec<String> = q.drain().iter().map(|e| e.path().to_string()).collect();
        assert_eq!(paths, ["b", "a", "b"]);
        assert!(q.is_empty());
    }
}
