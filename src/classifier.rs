//! Decides whether the controlled character can take a new input this frame.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionSpace};
use crate::info::Info;

// =============================================================================
// Control Codes
// =============================================================================

/// RAM encodings the classifier keys on. Defaults are Street Fighter II
/// Special Champion Edition (Genesis); other targets supply their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlCodes {
    pub round_timer_not_started: i64,
    pub standing_status: i64,
    pub crouching_status: i64,
    pub jumping_status: i64,
    pub attack_buttons: Vec<String>,
}

impl Default for ControlCodes {
    fn default() -> Self {
        Self {
            round_timer_not_started: 39208,
            standing_status: 512,
            crouching_status: 514,
            jumping_status: 516,
            attack_buttons: ["X", "Y", "Z", "A", "B", "C"]
                .iter()
                .map(|b| b.to_string())
                .collect(),
        }
    }
}

impl ControlCodes {
    pub fn is_free_status(&self, status: i64) -> bool {
        status == self.standing_status
            || status == self.crouching_status
            || status == self.jumping_status
    }

    pub fn is_attack_button(&self, button: &str) -> bool {
        self.attack_buttons.iter().any(|b| b == button)
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Why a frame does not accept input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lockout {
    /// Round intro still running.
    RoundNotStarted,
    /// Airborne after committing an attack; the status code alone reads as free.
    JumpAttack,
    /// Any other animation lock: hitstun, blockstun, throws, knockdown, landing.
    Status(i64),
}

#[derive(Debug, Clone, Default)]
pub struct ActionableClassifier {
    codes: ControlCodes,
}

impl ActionableClassifier {
    pub fn new(codes: ControlCodes) -> Self {
        Self { codes }
    }

    pub fn codes(&self) -> &ControlCodes {
        &self.codes
    }

    /// First matching lockout rule, or `None` when the frame is actionable.
    ///
    /// `last_action` must be the controlled player's own action, expressed in
    /// `space` (a single pad). Rules are checked in order: round not started,
    /// jump attack, non-free status.
    pub fn lockout(&self, info: &Info, last_action: &Action, space: &ActionSpace) -> Option<Lockout> {
        let codes = &self.codes;
        if info.round_timer() == codes.round_timer_not_started {
            return Some(Lockout::RoundNotStarted);
        }
        if info.status() == codes.jumping_status
            && space
                .meaning(last_action)
                .into_iter()
                .any(|b| codes.is_attack_button(b))
        {
            return Some(Lockout::JumpAttack);
        }
        if !codes.is_free_status(info.status()) {
            return Some(Lockout::Status(info.status()));
        }
        None
    }

    pub fn is_actionable(&self, info: &Info, last_action: &Action, space: &ActionSpace) -> bool {
        self.lockout(info, last_action, space).is_none()
    }
}
