use anyhow::{Result, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::BUTTONS_PER_PLAYER;

/// Button order of the Genesis pad as the emulation core lays out its action vector.
pub const GENESIS_BUTTONS: [&str; BUTTONS_PER_PLAYER] = [
    "B", "A", "MODE", "START", "UP", "DOWN", "LEFT", "RIGHT", "C", "Y", "X", "Z",
];

// =============================================================================
// Action
// =============================================================================

/// A fixed-length vector of button flags, packed into a bitmask.
///
/// Bit `i` is flag `i` of the emulation's action vector. The arity is carried
/// along so an action built for one action space cannot be silently fed to
/// another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    bits: u32,
    arity: u8,
}

impl Action {
    pub const MAX_ARITY: usize = 32;

    /// The all-zero action of the given arity.
    pub fn noop(arity: usize) -> Self {
        assert!(arity <= Self::MAX_ARITY, "action arity {arity} exceeds {}", Self::MAX_ARITY);
        Self {
            bits: 0,
            arity: arity as u8,
        }
    }

    /// Build from a 0/1 flag vector, as the emulation core takes it.
    pub fn from_flags(flags: &[u8]) -> Result<Self> {
        if flags.len() > Self::MAX_ARITY {
            bail!(
                "action has {} flags, at most {} are supported",
                flags.len(),
                Self::MAX_ARITY
            );
        }
        let mut bits = 0u32;
        for (i, &flag) in flags.iter().enumerate() {
            match flag {
                0 => {}
                1 => bits |= 1 << i,
                other => bail!("action flag {i} is {other}, expected 0 or 1"),
            }
        }
        Ok(Self {
            bits,
            arity: flags.len() as u8,
        })
    }

    /// Build an action with exactly the given flag indices pressed.
    pub fn with_pressed(arity: usize, pressed: &[usize]) -> Result<Self> {
        let mut action = Self::noop(arity);
        for &i in pressed {
            if i >= arity {
                bail!("button index {i} out of range for arity {arity}");
            }
            action.bits |= 1 << i;
        }
        Ok(action)
    }

    pub fn arity(&self) -> usize {
        self.arity as usize
    }

    pub fn is_pressed(&self, index: usize) -> bool {
        index < self.arity() && self.bits & (1 << index) != 0
    }

    pub fn is_noop(&self) -> bool {
        self.bits == 0
    }

    /// Indices of pressed flags, lowest first.
    pub fn pressed(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.arity()).filter(|&i| self.is_pressed(i))
    }

    pub fn flags(&self) -> Vec<u8> {
        (0..self.arity()).map(|i| self.is_pressed(i) as u8).collect()
    }
}

// =============================================================================
// Action Space
// =============================================================================

/// Multi-binary action space: one flag per button per player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpace {
    buttons: Vec<String>,
    players: usize,
}

impl ActionSpace {
    pub fn new(buttons: Vec<String>, players: usize) -> Result<Self> {
        if buttons.is_empty() {
            bail!("action space needs at least one button");
        }
        if players == 0 {
            bail!("action space needs at least one player");
        }
        if buttons.len() * players > Action::MAX_ARITY {
            bail!(
                "{} buttons x {players} players exceeds the {} flag limit",
                buttons.len(),
                Action::MAX_ARITY
            );
        }
        Ok(Self { buttons, players })
    }

    /// Six-button Genesis pad for one or two players.
    pub fn genesis(players: usize) -> Self {
        assert!((1..=2).contains(&players), "genesis pads support 1 or 2 players");
        Self {
            buttons: GENESIS_BUTTONS.iter().map(|b| b.to_string()).collect(),
            players,
        }
    }

    /// Button names of a single pad.
    pub fn buttons(&self) -> &[String] {
        &self.buttons
    }

    pub fn players(&self) -> usize {
        self.players
    }

    pub fn buttons_per_player(&self) -> usize {
        self.buttons.len()
    }

    pub fn arity(&self) -> usize {
        self.buttons.len() * self.players
    }

    pub fn noop(&self) -> Action {
        Action::noop(self.arity())
    }

    /// The space one player chooses from.
    pub fn player_space(&self) -> ActionSpace {
        Self {
            buttons: self.buttons.clone(),
            players: 1,
        }
    }

    pub fn index_of(&self, button: &str) -> Option<usize> {
        self.buttons.iter().position(|b| b == button)
    }

    /// Uniform sample: every flag independently pressed with probability 1/2.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Action {
        let arity = self.arity();
        let mask = if arity == 32 { u32::MAX } else { (1u32 << arity) - 1 };
        Action {
            bits: rng.random::<u32>() & mask,
            arity: arity as u8,
        }
    }

    /// Names of the pressed buttons, regardless of which pad they belong to.
    pub fn meaning(&self, action: &Action) -> Vec<&str> {
        let per_player = self.buttons.len();
        action
            .pressed()
            .map(|i| self.buttons[i % per_player].as_str())
            .collect()
    }

    pub fn validate(&self, action: &Action) -> Result<()> {
        if action.arity() != self.arity() {
            bail!(
                "action has {} flags, the action space expects {}",
                action.arity(),
                self.arity()
            );
        }
        Ok(())
    }

    /// Concatenate one action per player, player one first.
    pub fn combine(&self, per_player: &[Action]) -> Result<Action> {
        if per_player.len() != self.players {
            bail!(
                "got actions for {} players, the action space has {}",
                per_player.len(),
                self.players
            );
        }
        let width = self.buttons.len();
        let mut combined = self.noop();
        for (player, action) in per_player.iter().enumerate() {
            if action.arity() != width {
                bail!(
                    "player {} action has {} flags, a pad has {width}",
                    player + 1,
                    action.arity()
                );
            }
            combined.bits |= action.bits << (player * width);
        }
        Ok(combined)
    }

    /// The slice of a combined action that belongs to `player` (zero-based).
    pub fn player_action(&self, action: &Action, player: usize) -> Action {
        let width = self.buttons.len();
        let mask = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
        Action {
            bits: (action.bits >> (player * width)) & mask,
            arity: width as u8,
        }
    }
}
