/// Buttons on one Genesis six-button pad, in the order the emulation core exposes them.
pub const BUTTONS_PER_PLAYER: usize = 12;

pub mod action;
pub mod buffer;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod emulation;
pub mod info;
pub mod lobby;
pub mod nes;
pub mod player;

pub use action::{Action, ActionSpace, GENESIS_BUTTONS};
pub use buffer::{ExperienceBuffer, Transition};
pub use classifier::{ActionableClassifier, ControlCodes, Lockout};
pub use config::{ControllerConfig, LobbyConfig};
pub use controller::{FrameController, Resolved};
pub use emulation::{Emulation, EmulationFactory, Observation, StepOutcome};
pub use info::Info;
pub use lobby::{Lobby, LobbyError, LobbyMode, MatchSummary, RunSummary};
pub use nes::{GameData, NesEmulation, NesFactory};
pub use player::{ComboPlayer, EpisodeMemory, Player, RandomPlayer, SpecialMove};
