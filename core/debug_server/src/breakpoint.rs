//! Breakpoint storage and lookup.
//!
//! Breakpoints are indexed by source, then by line, and kept in insertion
//! order within a line. The registry also remembers the statement positions
//! of every parsed source, which is how a requested position is resolved to
//! a position the engine can actually stop at.

use crate::{SourceId, TextPosition, error::BreakpointError};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::{fmt, num::ParseIntError, str::FromStr};

/// Unique identifier for a breakpoint.
///
/// Identifiers are never reused for the lifetime of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreakpointId(u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BreakpointId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// A breakpoint request, before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointSpec {
    /// Requested zero-based line.
    pub line: u32,
    /// Requested zero-based column.
    #[serde(default)]
    pub column: u32,
    /// Expression that must evaluate to a truthy value for the breakpoint to hit.
    #[serde(default)]
    pub condition: Option<String>,
}

impl BreakpointSpec {
    /// Creates an unconditional breakpoint request.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            condition: None,
        }
    }

    /// Attaches a condition expression.
    #[must_use]
    pub fn with_condition<C: Into<String>>(mut self, condition: C) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// A breakpoint stored at its resolved position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    id: BreakpointId,
    source: SourceId,
    line: u32,
    column: u32,
    condition: Option<String>,
}

impl Breakpoint {
    /// The breakpoint's identifier.
    #[must_use]
    pub const fn id(&self) -> BreakpointId {
        self.id
    }

    /// The source this breakpoint belongs to.
    #[must_use]
    pub const fn source(&self) -> SourceId {
        self.source
    }

    /// The resolved position.
    #[must_use]
    pub const fn position(&self) -> TextPosition {
        TextPosition::new(self.line, self.column)
    }

    /// The condition expression, if any. Blank conditions are stored as `None`.
    #[must_use]
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Whether this breakpoint stops at `position`.
    ///
    /// Clients usually strip indentation, so a breakpoint at column 0 also
    /// matches the first statement executed on its line.
    fn matches(&self, position: TextPosition, previous_line: Option<u32>) -> bool {
        self.line == position.line
            && (self.column == position.column
                || (self.column == 0 && previous_line != Some(position.line)))
    }
}

/// Where a breakpoint ended up after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBreakpoint {
    /// Identifier of the new breakpoint.
    pub id: BreakpointId,
    /// The line the breakpoint was placed on.
    pub actual_line: u32,
    /// The column the breakpoint was placed on.
    pub actual_column: u32,
}

type BreakpointsInLine = Vec<Breakpoint>;
type LineToBreakpoints = FxHashMap<u32, BreakpointsInLine>;

/// Breakpoints indexed by source and line.
#[derive(Debug)]
pub struct BreakpointRegistry {
    /// Sorted statement positions of every parsed source.
    statements: FxHashMap<SourceId, Vec<TextPosition>>,
    breakpoints: FxHashMap<SourceId, LineToBreakpoints>,
    /// Reverse index used by removal.
    locations: FxHashMap<BreakpointId, (SourceId, u32)>,
    next_id: u32,
    activated: bool,
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl BreakpointRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(activated: bool) -> Self {
        Self {
            statements: FxHashMap::default(),
            breakpoints: FxHashMap::default(),
            locations: FxHashMap::default(),
            next_id: 1,
            activated,
        }
    }

    /// Records (or replaces) the statement positions of a source.
    pub fn register_source<I>(&mut self, source: SourceId, statements: I)
    where
        I: IntoIterator<Item = TextPosition>,
    {
        let mut statements: Vec<_> = statements.into_iter().collect();
        statements.sort_unstable();
        statements.dedup();
        log::trace!("source {source}: {} statement positions", statements.len());
        self.statements.insert(source, statements);
    }

    /// Whether the engine reported this source.
    #[must_use]
    pub fn is_known_source(&self, source: SourceId) -> bool {
        self.statements.contains_key(&source)
    }

    /// Finds the first statement position at or after `requested`.
    pub fn resolve_position(
        &self,
        source: SourceId,
        requested: TextPosition,
    ) -> Result<TextPosition, BreakpointError> {
        let statements = self
            .statements
            .get(&source)
            .ok_or(BreakpointError::UnknownSource(source))?;
        let index = statements.partition_point(|position| *position < requested);
        statements
            .get(index)
            .copied()
            .ok_or(BreakpointError::NoStatementPosition {
                source_id: source,
                position: requested,
            })
    }

    /// Sets a breakpoint at the first statement at or after the requested position.
    pub fn set_breakpoint(
        &mut self,
        source: SourceId,
        spec: BreakpointSpec,
    ) -> Result<ResolvedBreakpoint, BreakpointError> {
        let requested = TextPosition::new(spec.line, spec.column);
        let position = self.resolve_position(source, requested)?;
        let condition = spec
            .condition
            .filter(|condition| !condition.trim().is_empty());

        let line = self
            .breakpoints
            .entry(source)
            .or_default()
            .entry(position.line)
            .or_default();

        if let Some(existing) = line
            .iter()
            .find(|bp| bp.column == position.column && bp.condition == condition)
        {
            return Err(BreakpointError::Duplicate {
                source_id: source,
                position,
                existing: existing.id,
            });
        }

        let id = BreakpointId(self.next_id);
        self.next_id += 1;

        line.push(Breakpoint {
            id,
            source,
            line: position.line,
            column: position.column,
            condition,
        });
        self.locations.insert(id, (source, position.line));

        log::debug!("breakpoint {id} set at {source}:{position} (requested {requested})");

        Ok(ResolvedBreakpoint {
            id,
            actual_line: position.line,
            actual_column: position.column,
        })
    }

    /// Removes a breakpoint, returning it if it was present.
    ///
    /// Removing an unknown id is not an error.
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Option<Breakpoint> {
        let (source, line) = self.locations.remove(&id)?;
        let lines = self.breakpoints.get_mut(&source)?;
        let in_line = lines.get_mut(&line)?;
        let index = in_line.iter().position(|bp| bp.id == id)?;
        let removed = in_line.remove(index);

        if in_line.is_empty() {
            lines.remove(&line);
            if lines.is_empty() {
                self.breakpoints.remove(&source);
            }
        }

        log::debug!("breakpoint {id} removed");
        Some(removed)
    }

    /// Removes every breakpoint. Known sources are kept.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
        self.locations.clear();
    }

    /// Enables or disables the effect of all breakpoints without deleting them.
    pub fn set_activated(&mut self, activated: bool) {
        self.activated = activated;
    }

    /// Whether breakpoints currently take effect.
    #[must_use]
    pub const fn is_activated(&self) -> bool {
        self.activated
    }

    /// Looks a breakpoint up by id.
    #[must_use]
    pub fn breakpoint(&self, id: BreakpointId) -> Option<&Breakpoint> {
        let (source, line) = self.locations.get(&id)?;
        self.breakpoints
            .get(source)?
            .get(line)?
            .iter()
            .find(|bp| bp.id == id)
    }

    /// All stored breakpoints, in the order they were set.
    #[must_use]
    pub fn breakpoints(&self) -> Vec<&Breakpoint> {
        let mut all: Vec<_> = self
            .breakpoints
            .values()
            .flat_map(|lines| lines.values())
            .flatten()
            .collect();
        all.sort_unstable_by_key(|bp| bp.id);
        all
    }

    /// Number of stored breakpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no breakpoints are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Breakpoints that stop at `position`, in insertion order.
    ///
    /// `previous_line` is the last line executed in the same source. Yields
    /// nothing while breakpoints are deactivated.
    pub fn breakpoints_at(
        &self,
        source: SourceId,
        position: TextPosition,
        previous_line: Option<u32>,
    ) -> impl Iterator<Item = &Breakpoint> + '_ {
        self.breakpoints
            .get(&source)
            .filter(|_| self.activated)
            .and_then(|lines| lines.get(&position.line))
            .into_iter()
            .flatten()
            .filter(move |bp| bp.matches(position, previous_line))
    }

    /// Whether an active breakpoint stops at `position`.
    #[must_use]
    pub fn has_breakpoint_at(&self, source: SourceId, position: TextPosition) -> bool {
        self.breakpoints_at(source, position, None).next().is_some()
    }
}
