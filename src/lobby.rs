use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::action::{Action, ActionSpace};
use crate::buffer::Transition;
use crate::classifier::ActionableClassifier;
use crate::config::{ControllerConfig, LobbyConfig};
use crate::controller::FrameController;
use crate::emulation::{EmulationFactory, Observation};
use crate::info::Info;
use crate::player::Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyMode {
    SinglePlayer = 1,
    TwoPlayer = 2,
}

impl LobbyMode {
    pub fn player_count(self) -> usize {
        self as usize
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("lobby has already reached the maximum of {capacity} players")]
    LobbyFull { capacity: usize },
    #[error("no player in slot {0}")]
    EmptySlot(usize),
    #[error("training runs need a single-player lobby, this one is {0:?}")]
    TrainingNeedsSinglePlayer(LobbyMode),
}

/// What one save state produced.
#[derive(Debug, Clone, Default)]
pub struct MatchSummary {
    pub state: String,
    pub decisions: u64,
    pub frames: u64,
    pub total_reward: f64,
    /// Decisions handed back early because the skip cap tripped.
    pub capped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub episodes: usize,
    pub matches: Vec<MatchSummary>,
}

impl RunSummary {
    pub fn total_reward(&self) -> f64 {
        self.matches.iter().map(|m| m.total_reward).sum()
    }

    pub fn decisions(&self) -> u64 {
        self.matches.iter().map(|m| m.decisions).sum()
    }
}

/// Seats decision-makers and runs them through save states.
pub struct Lobby<F: EmulationFactory> {
    factory: F,
    mode: LobbyMode,
    roster: Vec<String>,
    players: Vec<Option<Box<dyn Player>>>,
    classifier: ActionableClassifier,
    controller: ControllerConfig,
}

impl<F: EmulationFactory> Lobby<F> {
    pub fn new(factory: F, config: LobbyConfig) -> Self {
        let mut lobby = Self {
            factory,
            mode: config.mode,
            roster: config.roster,
            players: Vec::new(),
            classifier: ActionableClassifier::new(config.codes),
            controller: config.controller,
        };
        lobby.clear();
        lobby
    }

    pub fn mode(&self) -> LobbyMode {
        self.mode
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn set_roster(&mut self, roster: Vec<String>) {
        self.roster = roster;
    }

    pub fn controller_config_mut(&mut self) -> &mut ControllerConfig {
        &mut self.controller
    }

    /// Seat a player in the first empty slot and return the slot index.
    pub fn add_player(&mut self, player: Box<dyn Player>) -> Result<usize, LobbyError> {
        match self.players.iter().position(Option::is_none) {
            Some(slot) => {
                self.players[slot] = Some(player);
                Ok(slot)
            }
            None => Err(LobbyError::LobbyFull {
                capacity: self.players.len(),
            }),
        }
    }

    pub fn clear(&mut self) {
        self.players = (0..self.mode.player_count()).map(|_| None).collect();
    }

    pub fn is_full(&self) -> bool {
        self.players.iter().all(Option::is_some)
    }

    pub fn player(&self, slot: usize) -> Option<&dyn Player> {
        self.players.get(slot).and_then(|p| p.as_deref())
    }

    pub fn player_mut(&mut self, slot: usize) -> Option<&mut (dyn Player + 'static)> {
        self.players.get_mut(slot).and_then(|p| p.as_deref_mut())
    }

    /// Play one save state to completion, recording slot 0's transitions.
    pub fn play(&mut self, state: &str, real_time: bool) -> Result<MatchSummary> {
        if self.players.first().is_none_or(Option::is_none) {
            return Err(LobbyError::EmptySlot(0).into());
        }

        let env = self
            .factory
            .make(state, self.mode.player_count())
            .with_context(|| format!("Failed to create emulation for save state `{state}`"))?;
        let config = ControllerConfig {
            real_time: real_time || self.controller.real_time,
            ..self.controller.clone()
        };
        let mut controller = FrameController::new(env, self.classifier.clone(), config);
        let space = controller.action_space().clone();
        let pad = space.player_space();

        let start = controller
            .start()
            .with_context(|| format!("Failed to start save state `{state}`"))?;
        let mut summary = MatchSummary {
            state: state.to_string(),
            frames: start.frames as u64,
            ..Default::default()
        };
        let mut observation = start.observation;
        let mut info = start.info;
        let mut done = start.done;

        while !done {
            let action = self
                .decide(&space, &pad, &observation, &info)
                .with_context(|| format!("Decision failed in save state `{state}`"))?;
            let resolved = controller
                .resolve_decision(action)
                .with_context(|| format!("Frame advance failed in save state `{state}`"))?;

            summary.decisions += 1;
            summary.frames += resolved.frames as u64;
            summary.total_reward += resolved.reward;
            if resolved.capped {
                summary.capped += 1;
            }
            done = resolved.done;

            let transition = Transition {
                observation: std::mem::replace(&mut observation, resolved.observation.clone()),
                info: std::mem::replace(&mut info, resolved.info.clone()),
                action: space.player_action(&action, 0),
                reward: resolved.reward,
                next_observation: resolved.observation,
                next_info: resolved.info,
                done,
            };
            if let Some(player) = self.player_mut(0) {
                player.record(transition);
            }
        }

        controller.close();
        info!(
            state,
            decisions = summary.decisions,
            frames = summary.frames,
            reward = summary.total_reward,
            capped = summary.capped,
            "match finished"
        );
        Ok(summary)
    }

    fn decide(
        &mut self,
        space: &ActionSpace,
        pad: &ActionSpace,
        observation: &Observation,
        info: &Info,
    ) -> Result<Action> {
        let mut per_player = Vec::with_capacity(self.players.len());
        for (slot, seat) in self.players.iter_mut().enumerate() {
            let action = match seat {
                Some(player) => {
                    let action = player.decide(pad, observation, info)?;
                    pad.validate(&action).with_context(|| {
                        format!(
                            "Player `{}` in slot {slot} returned a malformed action",
                            player.name()
                        )
                    })?;
                    action
                }
                None => pad.noop(),
            };
            per_player.push(action);
        }
        space.combine(&per_player)
    }

    /// Run the roster `episodes` times with slot 0, reviewing after each pass.
    pub fn execute_training_run(
        &mut self,
        episodes: usize,
        review: bool,
        real_time: bool,
    ) -> Result<RunSummary> {
        if self.mode != LobbyMode::SinglePlayer {
            return Err(LobbyError::TrainingNeedsSinglePlayer(self.mode).into());
        }
        if self.player(0).is_none() {
            return Err(LobbyError::EmptySlot(0).into());
        }
        if self.roster.is_empty() {
            bail!("Training run needs at least one save state in the roster");
        }

        let mut summary = RunSummary::default();
        let roster = self.roster.clone();
        for episode in 0..episodes {
            info!(episode, states = roster.len(), "starting episode");
            if let Some(player) = self.player_mut(0) {
                player.prepare_for_fight();
            }
            for state in &roster {
                let played = self
                    .play(state, real_time)
                    .with_context(|| format!("Episode {episode}, save state `{state}`"))?;
                summary.matches.push(played);
            }
            if review {
                if let Some(player) = self.player_mut(0) {
                    player
                        .review_fight()
                        .with_context(|| format!("Review failed after episode {episode}"))?;
                }
            }
            summary.episodes += 1;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::RandomPlayer;

    struct NoEmulation;

    impl EmulationFactory for NoEmulation {
        fn make(&self, state: &str, _: usize) -> Result<Box<dyn crate::emulation::Emulation>> {
            bail!("no emulation for `{state}`")
        }
    }

    fn lobby(mode: LobbyMode) -> Lobby<NoEmulation> {
        let config = LobbyConfig {
            mode,
            ..Default::default()
        };
        Lobby::new(NoEmulation, config)
    }

    #[test]
    fn test_single_player_lobby_fills_one_slot() {
        let mut lobby = lobby(LobbyMode::SinglePlayer);
        assert_eq!(lobby.add_player(Box::new(RandomPlayer::seeded(4, 1))).unwrap(), 0);
        assert!(lobby.is_full());
        let err = lobby
            .add_player(Box::new(RandomPlayer::seeded(4, 2)))
            .unwrap_err();
        assert!(matches!(err, LobbyError::LobbyFull { capacity: 1 }));
    }

    #[test]
    fn test_two_player_lobby_fills_in_order() {
        let mut lobby = lobby(LobbyMode::TwoPlayer);
        assert!(!lobby.is_full());
        assert_eq!(lobby.add_player(Box::new(RandomPlayer::seeded(4, 1))).unwrap(), 0);
        assert!(!lobby.is_full());
        assert_eq!(lobby.add_player(Box::new(RandomPlayer::seeded(4, 2))).unwrap(), 1);
        assert!(matches!(
            lobby.add_player(Box::new(RandomPlayer::seeded(4, 3))),
            Err(LobbyError::LobbyFull { capacity: 2 })
        ));
    }

    #[test]
    fn test_clear_frees_slots() {
        let mut lobby = lobby(LobbyMode::TwoPlayer);
        lobby.add_player(Box::new(RandomPlayer::seeded(4, 1))).unwrap();
        lobby.add_player(Box::new(RandomPlayer::seeded(4, 2))).unwrap();
        lobby.clear();
        assert!(lobby.player(0).is_none());
        assert!(lobby.player(1).is_none());
        assert_eq!(lobby.add_player(Box::new(RandomPlayer::seeded(4, 3))).unwrap(), 0);
    }

    #[test]
    fn test_play_needs_player() {
        let mut lobby = lobby(LobbyMode::SinglePlayer);
        let err = lobby.play("ryu", false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::EmptySlot(0))
        ));
    }

    #[test]
    fn test_emulation_failure_propagates_state_name() {
        let mut lobby = lobby(LobbyMode::SinglePlayer);
        lobby.add_player(Box::new(RandomPlayer::seeded(4, 1))).unwrap();
        let err = lobby.play("guile", false).unwrap_err();
        assert!(format!("{err:#}").contains("guile"));
    }

    #[test]
    fn test_training_run_rejects_two_player() {
        let mut lobby = lobby(LobbyMode::TwoPlayer);
        lobby.add_player(Box::new(RandomPlayer::seeded(4, 1))).unwrap();
        let err = lobby.execute_training_run(1, true, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::TrainingNeedsSinglePlayer(LobbyMode::TwoPlayer))
        ));
    }
}
