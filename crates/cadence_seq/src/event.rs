//! Multi-subscriber event channels
//!
//! Handlers run synchronously, in subscription order, on the thread that
//! emits. Emission works on a snapshot, so a handler may subscribe more
//! handlers without disturbing the current emission.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

type Handler = Rc<RefCell<dyn FnMut()>>;

/// A synchronous signal with any number of subscribers
#[derive(Default)]
pub struct Event {
    handlers: RefCell<SmallVec<[Handler; 2]>>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler
    pub fn connect<F>(&self, handler: F)
    where
        F: FnMut() + 'static,
    {
        let handler: Handler = Rc::new(RefCell::new(handler));
        self.handlers.borrow_mut().push(handler);
    }

    /// Invoke every subscriber
    ///
    /// A handler that is already running further up the stack is skipped for
    /// the nested emission.
    pub fn emit(&self) {
        let snapshot: SmallVec<[Handler; 2]> = self.handlers.borrow().clone();
        for handler in snapshot.iter() {
            if let Ok(mut f) = handler.try_borrow_mut() {
                (*f)();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.handlers.borrow_mut().clear();
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("subscribers", &self.len())
            .finish()
    }
}
