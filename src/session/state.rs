use crate::foundation::error::{StitchError, StitchResult};

/// Lifecycle of one stitch job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Job accepted, nothing checked yet.
    Configured,
    /// Validating parameters and acquiring sources, model and encoder.
    Validating,
    /// Stages are processing frames.
    Running,
    /// Output finalized.
    Completed,
    /// Terminal failure; partial output may remain on disk.
    Failed,
}

impl PipelineState {
    /// `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal edge.
    pub fn can_transition_to(self, next: Self) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Configured, Validating) | (Validating, Running) | (Running, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configured => "configured",
            Self::Validating => "validating",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Current state plus every state visited, in order.
#[derive(Clone, Debug)]
pub struct JobStateMachine {
    history: Vec<PipelineState>,
}

impl Default for JobStateMachine {
    fn default() -> Self {
        Self {
            history: vec![PipelineState::Configured],
        }
    }
}

impl JobStateMachine {
    /// Machine in `Configured`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Configured)
    }

    /// Visited states, oldest first.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Move to `next`, rejecting edges the lifecycle does not allow.
    pub fn transition(&mut self, next: PipelineState) -> StitchResult<()> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(StitchError::Other(anyhow::anyhow!(
                "illegal pipeline transition {from} -> {next}"
            )));
        }
        tracing::debug!(%from, to = %next, "pipeline state");
        self.history.push(next);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/state.rs"]
mod tests;
