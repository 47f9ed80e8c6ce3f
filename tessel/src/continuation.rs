//! Suspended interpreter state.
use std::fmt;

use crate::interpreter::Frame;
use crate::value::Value;

/// Snapshot of every frame of a suspended run: instruction pointers,
/// operand stacks and the activation chain.
///
/// Resuming works on a copy, so one token can be resumed any number of
/// times. Frames that keep their locals in an activation record share that
/// record between resumptions; frames without one get their own copy of
/// the locals.
#[derive(Clone)]
pub struct ResumeToken {
    frames: Vec<Frame>,
}

impl ResumeToken {
    pub(crate) fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub(crate) fn frames(&self) -> Vec<Frame> {
        self.frames.clone()
    }

    /// Number of interpreter frames captured.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Unit that executed the `yield`.
    pub fn unit_name(&self) -> Option<&str> {
        self.frames.last().map(|frame| frame.unit().display_name())
    }

    /// Source line of the `yield`, when known.
    pub fn line(&self) -> Option<u32> {
        self.frames.last().and_then(Frame::line)
    }
}

impl fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeToken")
            .field("depth", &self.depth())
            .field("unit", &self.unit_name())
            .field("line", &self.line())
            .finish()
    }
}

/// What a `yield` hands to the host.
#[derive(Debug, Clone)]
pub struct Suspension {
    pub value: Value,
    pub token: ResumeToken,
}
