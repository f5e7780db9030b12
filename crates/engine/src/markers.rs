//! Per-record LIFO of statuses to come back to.
//!
//! A jump with `mark` pushes the status being left; a jump to `_previous`
//! pops it. The stack is part of the record and persisted with it.

use serde::{Deserialize, Serialize};

use crate::models::{StatusId, PREVIOUS};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerStack(Vec<StatusId>);

impl MarkerStack {
    pub fn push(&mut self, status: impl Into<StatusId>) {
        self.0.push(status.into());
    }

    pub fn pop(&mut self) -> Option<StatusId> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[StatusId] {
        &self.0
    }
}

impl From<Vec<StatusId>> for MarkerStack {
    fn from(statuses: Vec<StatusId>) -> Self {
        Self(statuses)
    }
}

/// Where a jump lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Status(StatusId),
    /// `_previous` with nothing marked: the record stays put.
    Stay,
}

/// Resolve a jump target against the stack, pushing or popping as needed.
///
/// `current` is pushed only for a real target with `mark` set.
pub fn resolve_target(
    stack: &mut MarkerStack,
    current: &str,
    target: &str,
    mark: bool,
) -> Destination {
    if target == PREVIOUS {
        return match stack.pop() {
            Some(status) => Destination::Status(status),
            None => Destination::Stay,
        };
    }
    if mark {
        stack.push(current);
    }
    Destination::Status(target.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_on_empty_stack_stays() {
        let mut stack = MarkerStack::default();
        assert_eq!(
            resolve_target(&mut stack, "s1", PREVIOUS, false),
            Destination::Stay
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn marked_jump_then_previous_returns() {
        let mut stack = MarkerStack::default();
        assert_eq!(
            resolve_target(&mut stack, "s1", "detour", true),
            Destination::Status("detour".into())
        );
        assert_eq!(stack.as_slice(), ["s1".to_string()]);
        assert_eq!(
            resolve_target(&mut stack, "detour", PREVIOUS, false),
            Destination::Status("s1".into())
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn mark_on_previous_does_not_push() {
        let mut stack = MarkerStack::from(vec!["a".to_string()]);
        resolve_target(&mut stack, "b", PREVIOUS, true);
        assert!(stack.is_empty());
    }

    #[test]
    fn unmarked_jump_leaves_stack_alone() {
        let mut stack = MarkerStack::default();
        resolve_target(&mut stack, "s1", "s2", false);
        assert_eq!(stack.len(), 0);
    }
}
