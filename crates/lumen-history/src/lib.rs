//! Undo/redo command history for Lumen editors.
//!
//! Edits are expressed as [`Command`]s applied to a target. A
//! [`CommandHistory`] keeps two stacks: executing a command pushes it on the
//! undo stack and clears the redo stack; undoing moves it to the redo stack;
//! redoing moves it back.

use std::collections::VecDeque;
use tracing::debug;

/// Default number of undo steps kept.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// A reversible edit.
pub trait Command {
    /// The state the command edits.
    type Target;

    /// Applies the edit. Also used to redo it.
    fn execute(&mut self, target: &mut Self::Target);

    /// Reverts the edit.
    fn undo(&mut self, target: &mut Self::Target);

    /// Human-readable label, e.g. for an "Undo move pole" menu entry.
    fn description(&self) -> String;
}

/// Two-stack undo/redo history.
#[derive(Debug)]
pub struct CommandHistory<C> {
    undo_stack: VecDeque<C>,
    redo_stack: Vec<C>,
    max_depth: usize,
}

impl<C: Command> CommandHistory<C> {
    /// History keeping at most [`DEFAULT_MAX_DEPTH`] undo steps.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// History keeping at most `max_depth` undo steps (at least one).
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Runs `command` and records it. Clears the redo stack.
    pub fn execute(&mut self, mut command: C, target: &mut C::Target) {
        command.execute(target);
        self.undo_stack.push_back(command);
        self.redo_stack.clear();

        if self.undo_stack.len() > self.max_depth {
            let excess = self.undo_stack.len() - self.max_depth;
            self.undo_stack.drain(0..excess);
            debug!(excess, max_depth = self.max_depth, "Trimmed oldest undo steps");
        }
    }

    /// Reverts the most recent command.
    ///
    /// Returns `false` when there is nothing to undo.
    pub fn undo(&mut self, target: &mut C::Target) -> bool {
        let Some(mut command) = self.undo_stack.pop_back() else {
            return false;
        };
        command.undo(target);
        self.redo_stack.push(command);
        true
    }

    /// Re-applies the most recently undone command.
    ///
    /// Returns `false` when there is nothing to redo.
    pub fn redo(&mut self, target: &mut C::Target) -> bool {
        let Some(mut command) = self.redo_stack.pop() else {
            return false;
        };
        command.execute(target);
        self.undo_stack.push_back(command);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Label of the command `undo` would revert.
    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(C::description)
    }

    /// Label of the command `redo` would re-apply.
    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.last().map(C::description)
    }

    /// Forgets both stacks, e.g. when an editing transaction ends.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Number of undo steps held.
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    /// Number of redo steps held.
    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl<C: Command> Default for CommandHistory<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Several commands applied and reverted as one step.
#[derive(Debug)]
pub struct BatchCommand<C> {
    description: String,
    commands: Vec<C>,
}

impl<C: Command> BatchCommand<C> {
    #[must_use]
    pub fn new(description: impl Into<String>, commands: Vec<C>) -> Self {
        Self {
            description: description.into(),
            commands,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<C: Command> Command for BatchCommand<C> {
    type Target = C::Target;

    fn execute(&mut self, target: &mut Self::Target) {
        for command in &mut self.commands {
            command.execute(target);
        }
    }

    fn undo(&mut self, target: &mut Self::Target) {
        for command in self.commands.iter_mut().rev() {
            command.undo(target);
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
