use anyhow::Result;

use crate::action::{Action, ActionSpace};
use crate::info::Info;

/// Whatever the emulation hands the decision-maker each frame (pixels or RAM).
pub type Observation = Vec<u8>;

/// Result of one raw emulated frame.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub info: Info,
}

/// A running emulation loaded at one save state.
pub trait Emulation {
    /// Restore the save state. `Info` is not available until the first `step`.
    fn reset(&mut self) -> Result<Observation>;

    /// Advance exactly one frame with `action` held.
    fn step(&mut self, action: &Action) -> Result<StepOutcome>;

    fn action_space(&self) -> &ActionSpace;

    fn render(&mut self) -> Result<()>;

    /// Release the emulation and any viewer window. Safe to call twice.
    fn close(&mut self);
}

/// Creates emulations for named save states.
pub trait EmulationFactory {
    fn make(&self, state: &str, players: usize) -> Result<Box<dyn Emulation>>;
}
