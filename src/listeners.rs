// listeners.rs — host event subscriptions tied to a guard's lifetime

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    PointerDown,
    PointerMove,
    PointerUp,
    Resize,
}

impl ListenerKind {
    pub const ALL: [ListenerKind; 4] = [
        ListenerKind::PointerDown,
        ListenerKind::PointerMove,
        ListenerKind::PointerUp,
        ListenerKind::Resize,
    ];
}

/// Which host events currently have a subscriber. Single-threaded.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    active: Rc<RefCell<HashMap<ListenerKind, usize>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `kind` until the returned guard is released or dropped.
    #[must_use = "dropping the guard unregisters the listener immediately"]
    pub fn register(&self, kind: ListenerKind) -> ListenerGuard {
        *self.active.borrow_mut().entry(kind).or_insert(0) += 1;
        ListenerGuard {
            registry: Rc::clone(&self.active),
            kind,
            released: false,
        }
    }

    pub fn is_registered(&self, kind: ListenerKind) -> bool {
        self.active.borrow().get(&kind).copied().unwrap_or(0) > 0
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.active.borrow().values().sum()
    }
}

#[derive(Debug)]
pub struct ListenerGuard {
    registry: Rc<RefCell<HashMap<ListenerKind, usize>>>,
    kind: ListenerKind,
    released: bool,
}

impl ListenerGuard {
    /// Unregisters. Calling it again does nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let mut active = self.registry.borrow_mut();
        if let Some(count) = active.get_mut(&self.kind) {
            *count -= 1;
            if *count == 0 {
                active.remove(&self.kind);
            }
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.release();
    }
}
