use anyhow::{Context, Result, anyhow};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tracing::info;

use crate::action::{Action, ActionSpace};
use crate::buffer::{ExperienceBuffer, Transition};
use crate::emulation::Observation;
use crate::info::Info;

/// A decision-maker occupying a lobby slot.
pub trait Player {
    fn name(&self) -> &str;

    /// Choose the next action from `space` (this player's pad).
    fn decide(&mut self, space: &ActionSpace, observation: &Observation, info: &Info)
    -> Result<Action>;

    /// Take ownership of one macro-transition, in the order they happened.
    fn record(&mut self, transition: Transition);

    /// Episode start: start a fresh buffer.
    fn prepare_for_fight(&mut self);

    /// Episode end: consume what the buffer holds.
    fn review_fight(&mut self) -> Result<()>;

    fn buffer(&self) -> Option<&ExperienceBuffer> {
        None
    }
}

// =============================================================================
// Episode Memory
// =============================================================================

/// Per-episode experience owned by one player, optionally dumped to disk on review.
#[derive(Debug)]
pub struct EpisodeMemory {
    buffer: ExperienceBuffer,
    dump_dir: Option<PathBuf>,
    episode: u64,
}

impl EpisodeMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: ExperienceBuffer::new(capacity),
            dump_dir: None,
            episode: 0,
        }
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    pub fn buffer(&self) -> &ExperienceBuffer {
        &self.buffer
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn record(&mut self, t: Transition) {
        self.buffer.push(t);
    }

    pub fn reset(&mut self) {
        self.buffer = ExperienceBuffer::new(self.buffer.capacity());
    }

    /// Write the episode out (if a dump directory is set) and return the record count.
    pub fn review(&mut self, owner: &str) -> Result<usize> {
        let count = self.buffer.len();
        info!(
            player = owner,
            episode = self.episode,
            transitions = count,
            reward = self.buffer.total_reward(),
            "reviewing fight"
        );
        if let Some(dir) = &self.dump_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create dump dir: {}", dir.display()))?;
            let path = dir.join(format!("episode-{:04}.bin", self.episode));
            self.buffer
                .save(&path)
                .with_context(|| format!("Failed to write episode: {}", path.display()))?;
            info!(path = %path.display(), "episode written");
        }
        self.episode += 1;
        Ok(count)
    }
}

// =============================================================================
// Random Player
// =============================================================================

/// Presses a uniformly sampled button combination at every decision point.
pub struct RandomPlayer {
    name: String,
    memory: EpisodeMemory,
    rng: SmallRng,
}

impl RandomPlayer {
    pub fn new(capacity: usize) -> Self {
        Self {
            name: "random".to_string(),
            memory: EpisodeMemory::new(capacity),
            rng: SmallRng::from_os_rng(),
        }
    }

    pub fn seeded(capacity: usize, seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            ..Self::new(capacity)
        }
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.memory = self.memory.with_dump_dir(dir);
        self
    }

    pub fn memory(&self) -> &EpisodeMemory {
        &self.memory
    }
}

impl Player for RandomPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, space: &ActionSpace, _: &Observation, _: &Info) -> Result<Action> {
        Ok(space.sample(&mut self.rng))
    }

    fn record(&mut self, transition: Transition) {
        self.memory.record(transition);
    }

    fn prepare_for_fight(&mut self) {
        self.memory.reset();
    }

    fn review_fight(&mut self) -> Result<()> {
        self.memory.review(&self.name)?;
        Ok(())
    }

    fn buffer(&self) -> Option<&ExperienceBuffer> {
        Some(self.memory.buffer())
    }
}

// =============================================================================
// Combo Player
// =============================================================================

/// Multi-frame special move inputs, written for a character facing right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialMove {
    Hadoken,
    Tatsumaki,
    DragonUppercut,
}

impl SpecialMove {
    pub const ALL: [SpecialMove; 3] = [
        SpecialMove::Hadoken,
        SpecialMove::Tatsumaki,
        SpecialMove::DragonUppercut,
    ];

    /// Buttons held on each frame of the motion.
    pub fn frames(self) -> &'static [&'static [&'static str]] {
        const HADOKEN: &[&[&str]] = &[&["DOWN"], &["DOWN", "RIGHT"], &["RIGHT", "Y"]];
        const TATSUMAKI: &[&[&str]] = &[&["DOWN"], &["DOWN", "LEFT"], &["LEFT"], &["A"]];
        const DRAGON_UPPERCUT: &[&[&str]] =
            &[&["RIGHT"], &["DOWN", "RIGHT"], &["DOWN"], &["RIGHT"], &["Y"]];
        match self {
            SpecialMove::Hadoken => HADOKEN,
            SpecialMove::Tatsumaki => TATSUMAKI,
            SpecialMove::DragonUppercut => DRAGON_UPPERCUT,
        }
    }
}

/// Pads without the six-button layout fold punches onto `B` and kicks onto `A`.
const STAND_INS: &[(&str, &str)] = &[
    ("X", "B"),
    ("Y", "B"),
    ("Z", "B"),
    ("C", "A"),
];

/// Pad index for a motion button, trying its stand-in when the pad lacks it.
fn pad_index(space: &ActionSpace, button: &str) -> Option<usize> {
    space.index_of(button).or_else(|| {
        STAND_INS
            .iter()
            .find(|(from, _)| *from == button)
            .and_then(|(_, to)| space.index_of(to))
    })
}

/// Strings special moves together, one motion frame per decision point.
///
/// Inputs are only accepted on actionable frames, so a motion made of
/// directions flows one frame at a time; the final attack frame is followed by
/// whatever lock the move causes.
pub struct ComboPlayer {
    name: String,
    moves: Vec<SpecialMove>,
    current: Option<(SpecialMove, usize)>,
    memory: EpisodeMemory,
    rng: SmallRng,
}

impl ComboPlayer {
    pub fn new(capacity: usize, moves: Vec<SpecialMove>) -> Self {
        let moves = if moves.is_empty() {
            SpecialMove::ALL.to_vec()
        } else {
            moves
        };
        Self {
            name: "combo".to_string(),
            moves,
            current: None,
            memory: EpisodeMemory::new(capacity),
            rng: SmallRng::from_os_rng(),
        }
    }

    pub fn seeded(capacity: usize, moves: Vec<SpecialMove>, seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            ..Self::new(capacity, moves)
        }
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.memory = self.memory.with_dump_dir(dir);
        self
    }

    fn next_frame(&mut self) -> &'static [&'static str] {
        let (special, frame) = match self.current {
            Some(cur) => cur,
            None => (self.moves[self.rng.random_range(0..self.moves.len())], 0),
        };
        let frames = special.frames();
        self.current = if frame + 1 < frames.len() {
            Some((special, frame + 1))
        } else {
            None
        };
        frames[frame]
    }
}

impl Player for ComboPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, space: &ActionSpace, _: &Observation, _: &Info) -> Result<Action> {
        let buttons = self.next_frame();
        let pressed = buttons
            .iter()
            .map(|b| {
                pad_index(space, b)
                    .ok_or_else(|| anyhow!("pad has no `{b}` button for special moves"))
            })
            .collect::<Result<Vec<_>>>()?;
        Action::with_pressed(space.arity(), &pressed)
    }

    fn record(&mut self, transition: Transition) {
        self.memory.record(transition);
    }

    fn prepare_for_fight(&mut self) {
        self.memory.reset();
        self.current = None;
    }

    fn review_fight(&mut self) -> Result<()> {
        self.memory.review(&self.name)?;
        Ok(())
    }

    fn buffer(&self) -> Option<&ExperienceBuffer> {
        Some(self.memory.buffer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs() -> Observation {
        vec![]
    }

    fn transition(reward: f64) -> Transition {
        Transition {
            observation: obs(),
            info: Info::new(512, 512, 99),
            action: Action::noop(12),
            reward,
            next_observation: obs(),
            next_info: Info::new(512, 512, 99),
            done: false,
        }
    }

    #[test]
    fn test_combo_plays_full_motion() {
        let space = ActionSpace::genesis(1);
        let info = Info::new(512, 512, 99);
        let mut player = ComboPlayer::seeded(8, vec![SpecialMove::Hadoken], 1);
        let mut seen = Vec::new();
        for _ in 0..6 {
            let action = player.decide(&space, &obs(), &info).unwrap();
            seen.push(space.meaning(&action));
        }
        assert_eq!(
            seen,
            vec![
                vec!["DOWN"],
                vec!["DOWN", "RIGHT"],
                vec!["RIGHT", "Y"],
                vec!["DOWN"],
                vec!["DOWN", "RIGHT"],
                vec!["RIGHT", "Y"],
            ]
        );
    }

    fn motion(special: SpecialMove, space: &ActionSpace, decisions: usize) -> Vec<Vec<String>> {
        let info = Info::new(512, 512, 99);
        let mut player = ComboPlayer::seeded(8, vec![special], 3);
        (0..decisions)
            .map(|_| {
                let action = player.decide(space, &obs(), &info).unwrap();
                space.meaning(&action).iter().map(|b| b.to_string()).collect()
            })
            .collect()
    }

    #[test]
    fn test_every_special_move_motion() {
        let space = ActionSpace::genesis(1);
        assert_eq!(
            motion(SpecialMove::Tatsumaki, &space, 4),
            vec![vec!["DOWN"], vec!["DOWN", "LEFT"], vec!["LEFT"], vec!["A"]]
        );
        assert_eq!(
            motion(SpecialMove::DragonUppercut, &space, 5),
            vec![
                vec!["RIGHT"],
                vec!["DOWN", "RIGHT"],
                vec!["DOWN"],
                vec!["RIGHT"],
                vec!["Y"],
            ]
        );
        for special in SpecialMove::ALL {
            let frames = special.frames();
            assert_eq!(motion(special, &space, frames.len() * 2).len(), frames.len() * 2);
        }
    }

    #[test]
    fn test_nes_pad_uses_stand_in_buttons() {
        let nes: Vec<String> = ["B", "A", "SELECT", "START", "UP", "DOWN", "LEFT", "RIGHT"]
            .iter()
            .map(|b| b.to_string())
            .collect();
        let space = ActionSpace::new(nes, 1).unwrap();
        assert_eq!(
            motion(SpecialMove::Hadoken, &space, 3),
            vec![vec!["DOWN"], vec!["DOWN", "RIGHT"], vec!["B", "RIGHT"]]
        );
        assert_eq!(motion(SpecialMove::DragonUppercut, &space, 5)[4], vec!["B"]);
        assert_eq!(motion(SpecialMove::Tatsumaki, &space, 4)[3], vec!["A"]);
    }

    #[test]
    fn test_combo_needs_named_buttons() {
        let space = ActionSpace::new(vec!["A".to_string(), "B".to_string()], 1).unwrap();
        let mut player = ComboPlayer::seeded(8, vec![SpecialMove::Hadoken], 1);
        assert!(player.decide(&space, &obs(), &Info::new(0, 0, 0)).is_err());
    }

    #[test]
    fn test_prepare_for_fight_resets_buffer() {
        let mut player = RandomPlayer::seeded(4, 9);
        player.record(transition(1.0));
        player.record(transition(2.0));
        assert_eq!(player.buffer().unwrap().len(), 2);
        player.prepare_for_fight();
        assert!(player.buffer().unwrap().is_empty());
        assert_eq!(player.buffer().unwrap().capacity(), 4);
    }

    #[test]
    fn test_review_dumps_episode() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = RandomPlayer::seeded(4, 9).with_dump_dir(dir.path());
        player.prepare_for_fight();
        player.record(transition(1.5));
        player.review_fight().unwrap();
        let loaded = ExperienceBuffer::load(dir.path().join("episode-0000.bin")).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(player.memory().episode(), 1);
    }

    #[test]
    fn test_random_player_uses_given_space() {
        let space = ActionSpace::genesis(1);
        let mut player = RandomPlayer::seeded(4, 5);
        let action = player.decide(&space, &obs(), &Info::new(0, 0, 0)).unwrap();
        assert_eq!(action.arity(), 12);
    }
}
