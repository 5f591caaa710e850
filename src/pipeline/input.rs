use crate::utils::{CsvIoError, Result};

/// Which source drives a pipeline. Exactly one kind of source may feed a
/// pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputState {
    #[default]
    Unattached,
    PushAttached,
    StreamAttached,
    Ended,
}

/// What the caller should do with a unit of pushed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    Forward,
    /// Dropped without a fault.
    Ignore,
}

impl InputState {
    pub fn push(&mut self) -> PushDecision {
        match self {
            InputState::Unattached | InputState::PushAttached => {
                *self = InputState::PushAttached;
                PushDecision::Forward
            }
            InputState::StreamAttached => {
                tracing::debug!("Push ignored, a streaming source drives this pipeline");
                PushDecision::Ignore
            }
            InputState::Ended => {
                tracing::debug!("Push ignored, input already ended");
                PushDecision::Ignore
            }
        }
    }

    /// `Ok(true)` when the stream should be started, `Ok(false)` when input has
    /// already ended.
    pub fn attach_stream(&mut self) -> Result<bool> {
        match self {
            InputState::Unattached => {
                *self = InputState::StreamAttached;
                Ok(true)
            }
            InputState::StreamAttached => Err(CsvIoError::InputConflict(
                "a streaming source is already attached".to_string(),
            )),
            InputState::PushAttached => Err(CsvIoError::InputConflict(
                "input is already being pushed".to_string(),
            )),
            InputState::Ended => {
                tracing::debug!("Stream ignored, input already ended");
                Ok(false)
            }
        }
    }

    /// Returns false when input had already ended.
    pub fn end(&mut self) -> bool {
        let was_open = *self != InputState::Ended;
        *self = InputState::Ended;
        was_open
    }

    pub fn is_ended(&self) -> bool {
        *self == InputState::Ended
    }
}
