//! Call frame snapshots.
//!
//! The server keeps a live stack of frames that hook events update in place.
//! When execution pauses, the live stack is published as a [`CallFrameChain`]:
//! an immutable arena of frame records, innermost first, whose caller links
//! are indices into the same arena. Chains are reference counted, so a
//! listener may keep one after the pause ends and still see a consistent
//! stack.

use crate::{SourceId, TextPosition};
use serde::Serialize;
use std::rc::Rc;

/// Index of a frame within one [`CallFrameChain`].
///
/// `FrameId(0)` is always the innermost frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FrameId(usize);

impl FrameId {
    /// The position of the frame counted from the innermost frame.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A frame as seen by the engine.
///
/// Used both for the live stack and when the host reports its frames from
/// scratch (see [`DebuggerHost::current_frames`](crate::DebuggerHost::current_frames)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// The source the frame executes.
    pub source: SourceId,
    /// The current position in that source.
    pub position: TextPosition,
    /// Name of the function, empty for top-level program code.
    pub function_name: String,
}

impl FrameInfo {
    /// Creates a new frame description.
    pub fn new<N: Into<String>>(source: SourceId, position: TextPosition, function_name: N) -> Self {
        Self {
            source,
            position,
            function_name: function_name.into(),
        }
    }
}

/// One activation record of a published chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    id: FrameId,
    source: SourceId,
    line: u32,
    column: u32,
    function_name: String,
    caller: Option<FrameId>,
}

impl CallFrame {
    /// The frame's index within its chain.
    #[must_use]
    pub const fn id(&self) -> FrameId {
        self.id
    }

    /// The source the frame executes.
    #[must_use]
    pub const fn source(&self) -> SourceId {
        self.source
    }

    /// The frame's position when the chain was published.
    #[must_use]
    pub const fn position(&self) -> TextPosition {
        TextPosition::new(self.line, self.column)
    }

    /// Name of the function, empty for top-level program code.
    #[must_use]
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// The calling frame, if any.
    #[must_use]
    pub const fn caller(&self) -> Option<FrameId> {
        self.caller
    }
}

/// An immutable snapshot of the active call frames, innermost first.
///
/// Cloning is cheap and shares the snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct CallFrameChain {
    frames: Rc<[CallFrame]>,
}

impl CallFrameChain {
    fn publish(live: &[FrameInfo]) -> Self {
        let depth = live.len();
        let frames = live
            .iter()
            .rev()
            .enumerate()
            .map(|(index, frame)| CallFrame {
                id: FrameId(index),
                source: frame.source,
                line: frame.position.line,
                column: frame.position.column,
                function_name: frame.function_name.clone(),
                caller: (index + 1 < depth).then_some(FrameId(index + 1)),
            })
            .collect();
        Self { frames }
    }

    /// The innermost frame.
    #[must_use]
    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.first()
    }

    /// Looks a frame up by id.
    #[must_use]
    pub fn get(&self, id: FrameId) -> Option<&CallFrame> {
        self.frames.get(id.0)
    }

    /// The frame that called `frame`.
    #[must_use]
    pub fn caller_of(&self, frame: &CallFrame) -> Option<&CallFrame> {
        frame.caller.and_then(|id| self.get(id))
    }

    /// Walks the chain from the innermost frame through the caller links.
    pub fn iter(&self) -> impl Iterator<Item = &CallFrame> + '_ {
        std::iter::successors(self.top(), |frame| self.caller_of(frame))
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the chain has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether both handles point at the same published snapshot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.frames, &other.frames)
    }
}

/// The live frame stack, outermost first.
///
/// Kept up to date by hook events; a published snapshot is cached until the
/// stack changes.
#[derive(Debug, Default)]
pub(crate) struct CallStack {
    live: Vec<FrameInfo>,
    published: Option<CallFrameChain>,
}

impl CallStack {
    pub(crate) fn push(&mut self, frame: FrameInfo) {
        self.live.push(frame);
        self.published = None;
    }

    pub(crate) fn pop(&mut self) -> Option<FrameInfo> {
        let frame = self.live.pop();
        if frame.is_some() {
            self.published = None;
        }
        frame
    }

    /// Moves the innermost frame to a new position.
    ///
    /// Statements executed with no frame on the stack get an anonymous one.
    pub(crate) fn update_top(&mut self, source: SourceId, position: TextPosition) {
        match self.live.last_mut() {
            Some(top) if top.source == source && top.position == position => return,
            Some(top) => {
                top.source = source;
                top.position = position;
            }
            None => self.live.push(FrameInfo::new(source, position, "")),
        }
        self.published = None;
    }

    pub(crate) fn depth(&self) -> usize {
        self.live.len()
    }

    /// Publishes the live stack, reusing the last snapshot if nothing moved.
    pub(crate) fn publish(&mut self) -> CallFrameChain {
        self.published
            .get_or_insert_with(|| CallFrameChain::publish(&self.live))
            .clone()
    }

    /// Replaces the live stack with frames reported by the host.
    pub(crate) fn rebuild(&mut self, frames: Vec<FrameInfo>) {
        self.live = frames;
        self.published = None;
    }

    pub(crate) fn clear(&mut self) {
        self.live.clear();
        self.published = None;
    }
}
