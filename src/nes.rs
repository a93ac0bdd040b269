//! NES emulation backed by tetanes-core.
//!
//! Frame info is decoded from RAM through a JSON game-data file that names
//! each variable's address, the same shape as a gym-retro `data.json`:
//!
//! ```json
//! {
//!   "info": {
//!     "status":       { "address": 1070, "type": "u16le" },
//!     "enemy_status": { "address": 1710, "type": "u16le" },
//!     "round_timer":  { "address": 1260, "type": "u16be" },
//!     "health":       { "address": 1066 }
//!   },
//!   "reward": { "health": 1.0, "enemy_health": -1.0 },
//!   "done": [ { "variable": "matches_won", "op": "equal", "reference": 2 } ]
//! }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tetanes_core::control_deck::{ControlDeck, HeadlessMode};
use tetanes_core::input::{JoypadBtnState, Player as Pad};
use tetanes_core::mem::Read;
use tracing::{debug, info};

use crate::action::{Action, ActionSpace};
use crate::emulation::{Emulation, EmulationFactory, Observation, StepOutcome};
use crate::info::{self, Info};

const NES_WIDTH: usize = 256;
const NES_HEIGHT: usize = 240;
const RAM_SIZE: u16 = 0x0800;

// =============================================================================
// Game Data
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RamType {
    #[default]
    U8,
    I8,
    U16le,
    U16be,
}

impl RamType {
    /// Value of a variable whose bytes start at `first`, followed by `second`.
    pub fn decode(self, first: u8, second: u8) -> i64 {
        match self {
            RamType::U8 => first as i64,
            RamType::I8 => first as i8 as i64,
            RamType::U16le => {
                let (lo, hi) = (first, second);
                u16::from_le_bytes([lo, hi]) as i64
            }
            RamType::U16be => {
                let (hi, lo) = (first, second);
                u16::from_be_bytes([hi, lo]) as i64
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamVariable {
    pub address: u16,
    #[serde(default, rename = "type")]
    pub kind: RamType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneOp {
    Equal,
    NotEqual,
    LessOrEqual,
    GreaterOrEqual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneCondition {
    pub variable: String,
    pub op: DoneOp,
    pub reference: i64,
}

impl DoneCondition {
    pub fn is_met(&self, values: &BTreeMap<String, i64>) -> bool {
        let Some(&value) = values.get(&self.variable) else {
            return false;
        };
        match self.op {
            DoneOp::Equal => value == self.reference,
            DoneOp::NotEqual => value != self.reference,
            DoneOp::LessOrEqual => value <= self.reference,
            DoneOp::GreaterOrEqual => value >= self.reference,
        }
    }
}

fn nes_buttons() -> Vec<String> {
    ["B", "A", "SELECT", "START", "UP", "DOWN", "LEFT", "RIGHT"]
        .iter()
        .map(|b| b.to_string())
        .collect()
}

/// RAM map, reward and termination rules for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameData {
    #[serde(default = "nes_buttons")]
    pub buttons: Vec<String>,
    pub info: BTreeMap<String, RamVariable>,
    /// Reward per unit change of each named variable.
    #[serde(default)]
    pub reward: BTreeMap<String, f64>,
    /// Any condition met ends the match.
    #[serde(default)]
    pub done: Vec<DoneCondition>,
    /// Hard stop for states that never meet a done condition.
    #[serde(default)]
    pub max_frames: Option<u64>,
}

impl GameData {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open game data: {}", path.display()))?;
        let data: GameData = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse game data: {}", path.display()))?;
        data.validate()?;
        Ok(data)
    }

    pub fn validate(&self) -> Result<()> {
        for field in [info::STATUS, info::ENEMY_STATUS, info::ROUND_TIMER] {
            if !self.info.contains_key(field) {
                bail!("game data has no RAM address for required field `{field}`");
            }
        }
        for name in self.reward.keys() {
            if !self.info.contains_key(name) {
                bail!("reward variable `{name}` is not in the info map");
            }
        }
        for cond in &self.done {
            if !self.info.contains_key(&cond.variable) {
                bail!("done variable `{}` is not in the info map", cond.variable);
            }
        }
        for button in &self.buttons {
            joypad_button(button)?;
        }
        Ok(())
    }
}

fn joypad_button(name: &str) -> Result<JoypadBtnState> {
    Ok(match name {
        "A" => JoypadBtnState::A,
        "B" => JoypadBtnState::B,
        "SELECT" => JoypadBtnState::SELECT,
        "START" => JoypadBtnState::START,
        "UP" => JoypadBtnState::UP,
        "DOWN" => JoypadBtnState::DOWN,
        "LEFT" => JoypadBtnState::LEFT,
        "RIGHT" => JoypadBtnState::RIGHT,
        other => bail!("NES pad has no `{other}` button"),
    })
}

fn blit_rgba_to_u32(fb: &[u8], out: &mut [u32]) {
    for (dst, src) in out.iter_mut().zip(fb.chunks_exact(4)) {
        *dst = ((src[0] as u32) << 16) | ((src[1] as u32) << 8) | (src[2] as u32);
    }
}

// =============================================================================
// NES Emulation
// =============================================================================

pub struct NesEmulation {
    deck: ControlDeck,
    data: Arc<GameData>,
    space: ActionSpace,
    pad_buttons: Vec<JoypadBtnState>,
    state: String,
    state_path: PathBuf,
    prev_values: BTreeMap<String, i64>,
    frames: u64,
    window: Option<minifb::Window>,
    pixels: Vec<u32>,
    closed: bool,
}

impl NesEmulation {
    fn peek(&self, addr: u16) -> u8 {
        self.deck.bus().peek(addr)
    }

    fn read_variable(&self, var: &RamVariable) -> i64 {
        let first = self.peek(var.address);
        let second = match var.kind {
            RamType::U8 | RamType::I8 => 0,
            RamType::U16le | RamType::U16be => self.peek(var.address.wrapping_add(1)),
        };
        var.kind.decode(first, second)
    }

    fn read_values(&self) -> BTreeMap<String, i64> {
        self.data
            .info
            .iter()
            .map(|(name, var)| (name.clone(), self.read_variable(var)))
            .collect()
    }

    /// Work RAM, the observation handed to decision-makers.
    fn read_ram(&self) -> Observation {
        (0..RAM_SIZE).map(|addr| self.peek(addr)).collect()
    }

    fn set_input(&mut self, action: &Action) {
        for player in 0..self.space.players() {
            let pad_action = self.space.player_action(action, player);
            let mut btn_state = JoypadBtnState::empty();
            for i in pad_action.pressed() {
                btn_state |= self.pad_buttons[i];
            }
            let pad = if player == 0 { Pad::One } else { Pad::Two };
            self.set_input_state(pad, btn_state);
        }
    }

    fn set_input_state(&mut self, pad: Pad, btn_state: JoypadBtnState) {
        let joypad = self.deck.joypad_mut(pad);
        for button in [
            JoypadBtnState::LEFT,
            JoypadBtnState::RIGHT,
            JoypadBtnState::UP,
            JoypadBtnState::DOWN,
            JoypadBtnState::A,
            JoypadBtnState::B,
            JoypadBtnState::START,
            JoypadBtnState::SELECT,
        ] {
            joypad.set_button(button, btn_state.contains(button));
        }
    }

    fn reward(&self, values: &BTreeMap<String, i64>) -> f64 {
        self.data
            .reward
            .iter()
            .map(|(name, weight)| {
                let cur = values.get(name).copied().unwrap_or(0);
                let prev = self.prev_values.get(name).copied().unwrap_or(cur);
                (cur - prev) as f64 * weight
            })
            .sum()
    }

    fn is_done(&self, values: &BTreeMap<String, i64>) -> bool {
        self.data.done.iter().any(|c| c.is_met(values))
            || self.data.max_frames.is_some_and(|max| self.frames >= max)
    }
}

impl Emulation for NesEmulation {
    fn reset(&mut self) -> Result<Observation> {
        self.deck
            .load_state(&self.state_path)
            .with_context(|| format!("Failed to load save state: {}", self.state_path.display()))?;
        self.frames = 0;
        self.prev_values = self.read_values();
        Ok(self.read_ram())
    }

    fn step(&mut self, action: &Action) -> Result<StepOutcome> {
        self.space.validate(action)?;
        self.set_input(action);
        self.deck.clock_frame()?;
        self.frames += 1;

        let values = self.read_values();
        let reward = self.reward(&values);
        let done = self.is_done(&values);
        self.prev_values = values.clone();

        Ok(StepOutcome {
            observation: self.read_ram(),
            reward,
            done,
            info: Info::from_fields(values)?,
        })
    }

    fn action_space(&self) -> &ActionSpace {
        &self.space
    }

    fn render(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.window.is_none() {
            let window = minifb::Window::new(
                &format!("fight-lobby — {}", self.state),
                NES_WIDTH,
                NES_HEIGHT,
                minifb::WindowOptions {
                    resize: true,
                    scale: minifb::Scale::X2,
                    ..Default::default()
                },
            )?;
            self.window = Some(window);
        }

        let fb = self.deck.frame_buffer();
        blit_rgba_to_u32(fb, &mut self.pixels);
        if let Some(window) = self.window.as_mut() {
            if window.is_open() {
                window.update_with_buffer(&self.pixels, NES_WIDTH, NES_HEIGHT)?;
            } else {
                info!(state = %self.state, "viewer closed, continuing headless");
                self.window = None;
                self.closed = true;
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.window.take().is_some() {
            debug!(state = %self.state, "viewer released");
        }
        self.closed = true;
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds an emulation per save state: `<states_dir>/<state>.state`.
pub struct NesFactory {
    rom: PathBuf,
    states_dir: PathBuf,
    data: Arc<GameData>,
    headless: bool,
}

impl NesFactory {
    pub fn new(rom: PathBuf, states_dir: PathBuf, data: GameData) -> Self {
        Self {
            rom,
            states_dir,
            data: Arc::new(data),
            headless: true,
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn state_path(&self, state: &str) -> PathBuf {
        self.states_dir.join(format!("{state}.state"))
    }
}

impl EmulationFactory for NesFactory {
    fn make(&self, state: &str, players: usize) -> Result<Box<dyn Emulation>> {
        if !(1..=2).contains(&players) {
            bail!("NES supports 1 or 2 players, got {players}");
        }
        let state_path = self.state_path(state);
        if !state_path.is_file() {
            bail!("Save state not found: {}", state_path.display());
        }

        let mut deck = ControlDeck::new();
        let headless_mode = if self.headless {
            HeadlessMode::NO_AUDIO | HeadlessMode::NO_VIDEO
        } else {
            HeadlessMode::NO_AUDIO
        };
        deck.set_headless_mode(headless_mode);
        deck.load_rom_path(&self.rom)
            .with_context(|| format!("Failed to load ROM: {}", self.rom.display()))?;

        let space = ActionSpace::new(self.data.buttons.clone(), players)?;
        let pad_buttons = self
            .data
            .buttons
            .iter()
            .map(|b| joypad_button(b))
            .collect::<Result<Vec<_>>>()?;

        Ok(Box::new(NesEmulation {
            deck,
            data: Arc::clone(&self.data),
            space,
            pad_buttons,
            state: state.to_string(),
            state_path,
            prev_values: BTreeMap::new(),
            frames: 0,
            window: None,
            pixels: vec![0u32; NES_WIDTH * NES_HEIGHT],
            closed: false,
        }))
    }
}
