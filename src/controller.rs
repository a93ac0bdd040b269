//! Turns the raw per-frame emulation loop into a loop of macro-decisions.
//!
//! One committed action is stepped once, then the no-op action is held while
//! the classifier reports the character locked. Rewards from every frame the
//! action caused are summed into a single result.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::action::{Action, ActionSpace};
use crate::classifier::{ActionableClassifier, Lockout};
use crate::config::ControllerConfig;
use crate::emulation::{Emulation, Observation, StepOutcome};
use crate::info::Info;

/// Outcome of one macro-decision.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub observation: Observation,
    pub info: Info,
    /// Sum of per-frame rewards, committed frame included.
    pub reward: f64,
    pub done: bool,
    /// Raw frames stepped, committed frame included.
    pub frames: u32,
    /// The skip cap tripped before an actionable frame showed up.
    pub capped: bool,
}

pub struct FrameController {
    env: Box<dyn Emulation>,
    classifier: ActionableClassifier,
    config: ControllerConfig,
    space: ActionSpace,
    pad: ActionSpace,
    frame_interval: Duration,
    next_frame_deadline: Option<Instant>,
    debug_frames: bool,
    closed: bool,
}

impl FrameController {
    pub fn new(
        env: Box<dyn Emulation>,
        classifier: ActionableClassifier,
        config: ControllerConfig,
    ) -> Self {
        let space = env.action_space().clone();
        let pad = space.player_space();
        let frame_interval = config.frame_interval();
        Self {
            env,
            classifier,
            config,
            space,
            pad,
            frame_interval,
            next_frame_deadline: None,
            debug_frames: Self::debug_frames_enabled(),
            closed: false,
        }
    }

    fn debug_frames_enabled() -> bool {
        match std::env::var("LOBBY_DEBUG_FRAMES") {
            Ok(val) => matches!(val.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
            Err(_) => false,
        }
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.space
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn set_real_time(&mut self, enabled: bool) {
        self.config.real_time = enabled;
        self.next_frame_deadline = None;
    }

    /// Reset the emulation and run to the first actionable frame.
    ///
    /// RAM info only exists after a step, so the first frame is a no-op step;
    /// the skip loop then runs with the no-op as the last action. Rewards
    /// earned during the intro are reported but belong to no decision.
    pub fn start(&mut self) -> Result<Resolved> {
        self.env.reset().context("Failed to reset emulation")?;
        self.next_frame_deadline = None;
        let noop = self.space.noop();
        let first = self.raw_step(&noop)?;
        self.skip_locked(first, &noop)
    }

    /// Commit `action` for one frame, then fast-forward through locked frames.
    pub fn resolve_decision(&mut self, action: Action) -> Result<Resolved> {
        self.space
            .validate(&action)
            .context("Decision-maker returned a malformed action")?;
        let first = self.raw_step(&action)?;
        self.skip_locked(first, &action)
    }

    fn skip_locked(&mut self, first: StepOutcome, committed: &Action) -> Result<Resolved> {
        let own_action = self.space.player_action(committed, 0);
        let noop = self.space.noop();

        let mut outcome = first;
        let mut reward = outcome.reward;
        let mut frames = 1u32;
        let mut skipped = 0u32;
        let mut capped = false;
        let mut last_lockout: Option<Lockout> = None;

        while !outcome.done {
            let Some(lockout) = self.classifier.lockout(&outcome.info, &own_action, &self.pad)
            else {
                break;
            };
            if self.config.max_skip_frames.is_some_and(|cap| skipped >= cap) {
                warn!(
                    skipped,
                    ?lockout,
                    status = outcome.info.status(),
                    "skip cap reached without an actionable frame, handing control back"
                );
                capped = true;
                break;
            }
            if self.debug_frames {
                trace!(
                    frame = frames,
                    ?lockout,
                    status = outcome.info.status(),
                    round_timer = outcome.info.round_timer(),
                    "skip"
                );
            }
            last_lockout = Some(lockout);
            outcome = self.raw_step(&noop)?;
            reward += outcome.reward;
            frames += 1;
            skipped += 1;
        }

        if skipped > 0 {
            debug!(skipped, ?last_lockout, reward, done = outcome.done, "locked frames skipped");
        }

        Ok(Resolved {
            observation: outcome.observation,
            info: outcome.info,
            reward,
            done: outcome.done,
            frames,
            capped,
        })
    }

    fn raw_step(&mut self, action: &Action) -> Result<StepOutcome> {
        let outcome = self.env.step(action).context("Emulation step failed")?;
        if self.config.render {
            self.env.render().context("Render failed")?;
        }
        if self.config.real_time {
            self.throttle_frame();
        }
        Ok(outcome)
    }

    fn throttle_frame(&mut self) {
        let now = Instant::now();
        match self.next_frame_deadline {
            Some(deadline) if deadline > now => {
                std::thread::sleep(deadline - now);
                self.next_frame_deadline = Some(deadline + self.frame_interval);
            }
            _ => {
                self.next_frame_deadline = Some(now + self.frame_interval);
            }
        }
    }

    /// Release the emulation and its viewer.
    pub fn close(&mut self) {
        if !self.closed {
            self.env.close();
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for FrameController {
    fn drop(&mut self) {
        self.close();
    }
}
