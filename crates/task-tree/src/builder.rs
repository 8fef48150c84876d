//! Builder utilities for ergonomic tree construction.
//!
//! This module provides helper functions to reduce boilerplate when building
//! trees. Instead of writing verbose `shared(Sequence::new(vec![...]))`, you
//! can use shorter functions like `sequence(vec![...])`.

use crate::error::{BoxError, ConfigError};
use crate::{Action, ConditionalBranch, RepeatingSequence, Sequence, SharedNode, shared};

/// Creates an action node.
///
/// Shorthand for `shared(Action::new(operation))`.
#[inline]
pub fn action<F>(operation: F) -> SharedNode
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    shared(Action::new(operation))
}

/// Creates an action node whose operation may raise an error.
#[inline]
pub fn fallible_action<F, E>(operation: F) -> SharedNode
where
    F: Fn() -> Result<bool, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    shared(Action::fallible(operation))
}

/// Creates a sequence node.
#[inline]
pub fn sequence(children: Vec<SharedNode>) -> SharedNode {
    shared(Sequence::new(children))
}

/// Creates a branch that runs `on_success` when `predicate` holds and
/// succeeds without running anything otherwise.
#[inline]
pub fn branch<P>(predicate: P, on_success: SharedNode) -> SharedNode
where
    P: Fn() -> bool + Send + Sync + 'static,
{
    shared(ConditionalBranch::new(predicate, on_success))
}

/// Creates an if/else branch.
#[inline]
pub fn branch_else<P>(predicate: P, on_success: SharedNode, on_failure: SharedNode) -> SharedNode
where
    P: Fn() -> bool + Send + Sync + 'static,
{
    shared(ConditionalBranch::new(predicate, on_success).otherwise(on_failure))
}

/// Creates a repeat running `children` exactly `count` times.
#[inline]
pub fn repeat(count: u64, children: Vec<SharedNode>) -> Result<SharedNode, ConfigError> {
    Ok(shared(RepeatingSequence::times(count, children)?))
}

/// Creates a repeat running `children` until one of them fails.
#[inline]
pub fn repeat_forever(children: Vec<SharedNode>) -> SharedNode {
    shared(RepeatingSequence::forever(children))
}

/// Creates a repeat running `children` until `condition` holds.
#[inline]
pub fn repeat_until<P>(condition: P, children: Vec<SharedNode>) -> SharedNode
where
    P: Fn() -> bool + Send + Sync + 'static,
{
    shared(RepeatingSequence::until(condition, children))
}
