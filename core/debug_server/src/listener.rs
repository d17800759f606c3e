//! Debug listeners and event fan-out.
//!
//! Listeners are registered per execution context and called in registration
//! order. Dispatch is guarded per event category: while listeners of a
//! category are being called, a nested dispatch of the same category is
//! dropped (not queued), so a listener can never re-trigger pause handling
//! while a snapshot is being delivered. Registry mutation from inside a
//! callback is always allowed.

use crate::{
    ContextId,
    event::{ParseError, PauseEvent, ScriptSource},
    server::DebugServer,
};
use bitflags::bitflags;
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

/// Receives debug events for the contexts it is registered on.
///
/// Every callback gets the server back, so it may set breakpoints or issue
/// stepping commands synchronously.
pub trait DebugListener {
    /// Execution paused. `event.call_frames` may be kept after the pause ends.
    fn did_pause(&self, _server: &DebugServer, _event: &PauseEvent) {}

    /// Execution resumed after a pause.
    fn did_continue(&self, _server: &DebugServer) {}

    /// A source was compiled. Content scripts are flagged so front ends can
    /// hide code that does not belong to the page.
    fn did_parse_source(
        &self,
        _server: &DebugServer,
        _source: &ScriptSource,
        _is_content_script: bool,
    ) {
    }

    /// A source failed to compile.
    fn failed_to_parse_source(
        &self,
        _server: &DebugServer,
        _source: &ScriptSource,
        _error: &ParseError,
    ) {
    }
}

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u32);

bitflags! {
    /// Categories of events guarded independently against re-entrant dispatch.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventCategory: u8 {
        /// `did_pause`.
        const PAUSE = 1;
        /// `did_continue`.
        const CONTINUE = 1 << 1;
        /// `did_parse_source` and `failed_to_parse_source`.
        const PARSE = 1 << 2;
    }
}

/// Result of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event reached this many listeners.
    Delivered(usize),
    /// The context has no listeners.
    NoListeners,
    /// A dispatch of the same category was already running; the event was dropped.
    Suppressed,
}

type ListenerSet = IndexMap<ListenerId, Rc<dyn DebugListener>, FxBuildHasher>;

/// Per-context listener sets and the dispatch guard.
#[derive(Default)]
pub struct ListenerDispatcher {
    sets: RefCell<FxHashMap<ContextId, ListenerSet>>,
    next_id: Cell<u32>,
    in_flight: Cell<EventCategory>,
}

impl fmt::Debug for ListenerDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sets = self.sets.borrow();
        f.debug_struct("ListenerDispatcher")
            .field(
                "listeners",
                &sets
                    .iter()
                    .map(|(context, set)| (*context, set.len()))
                    .collect::<FxHashMap<_, _>>(),
            )
            .field("in_flight", &self.in_flight.get())
            .finish_non_exhaustive()
    }
}

impl ListenerDispatcher {
    /// Registers a listener on a context.
    ///
    /// The boolean is `true` when this created the context's listener set.
    pub fn add(&self, context: ContextId, listener: Rc<dyn DebugListener>) -> (ListenerId, bool) {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);

        let mut sets = self.sets.borrow_mut();
        let set = sets.entry(context).or_default();
        let created = set.is_empty();
        set.insert(id, listener);

        log::debug!("listener {id:?} registered on context {context}");
        (id, created)
    }

    /// Unregisters a listener. The context's set is dropped once empty.
    ///
    /// Returns whether the listener was registered.
    pub fn remove(&self, context: ContextId, id: ListenerId) -> bool {
        let mut sets = self.sets.borrow_mut();
        let Some(set) = sets.get_mut(&context) else {
            return false;
        };
        let removed = set.shift_remove(&id).is_some();
        if set.is_empty() {
            sets.remove(&context);
        }
        removed
    }

    /// Drops every listener of a context, returning how many there were.
    pub fn detach(&self, context: ContextId) -> usize {
        self.sets
            .borrow_mut()
            .remove(&context)
            .map_or(0, |set| set.len())
    }

    /// Whether any listener is registered on the context.
    #[must_use]
    pub fn has_listeners(&self, context: ContextId) -> bool {
        self.sets
            .borrow()
            .get(&context)
            .is_some_and(|set| !set.is_empty())
    }

    /// Number of listeners registered on the context.
    #[must_use]
    pub fn listener_count(&self, context: ContextId) -> usize {
        self.sets.borrow().get(&context).map_or(0, |set| set.len())
    }

    /// Whether a dispatch of `category` is running.
    #[must_use]
    pub fn is_dispatching(&self, category: EventCategory) -> bool {
        self.in_flight.get().intersects(category)
    }

    /// Calls `f` on every listener of the context, in registration order.
    ///
    /// The listener list is copied first, so callbacks may add or remove
    /// listeners; changes apply to the next dispatch.
    pub fn dispatch<F>(&self, context: ContextId, category: EventCategory, mut f: F) -> DispatchOutcome
    where
        F: FnMut(&dyn DebugListener),
    {
        if self.is_dispatching(category) {
            log::warn!("dropped re-entrant {category:?} dispatch for context {context}");
            return DispatchOutcome::Suppressed;
        }

        let listeners: Vec<_> = match self.sets.borrow().get(&context) {
            Some(set) if !set.is_empty() => set.values().cloned().collect(),
            _ => return DispatchOutcome::NoListeners,
        };

        let _guard = InFlight::enter(&self.in_flight, category);
        for listener in &listeners {
            f(listener.as_ref());
        }
        DispatchOutcome::Delivered(listeners.len())
    }
}

/// Marks a category as in flight for the lifetime of the guard.
struct InFlight<'a> {
    cell: &'a Cell<EventCategory>,
    category: EventCategory,
}

impl<'a> InFlight<'a> {
    fn enter(cell: &'a Cell<EventCategory>, category: EventCategory) -> Self {
        cell.set(cell.get() | category);
        Self { cell, category }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.cell.set(self.cell.get() - self.category);
    }
}
