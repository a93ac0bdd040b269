//! Scripted stand-in for an emulation, shared by the integration tests.

#![allow(dead_code)]

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fight_lobby::{
    Action, ActionSpace, Emulation, EmulationFactory, Info, Observation, StepOutcome,
};

pub const NOT_STARTED: i64 = 39208;
pub const STANDING: i64 = 512;
pub const CROUCHING: i64 = 514;
pub const JUMPING: i64 = 516;
pub const HITSTUN: i64 = 522;

/// One scripted frame: what the emulation reports after a step.
#[derive(Debug, Clone)]
pub struct Frame {
    pub reward: f64,
    pub done: bool,
    pub info: Info,
}

pub fn frame(status: i64, reward: f64) -> Frame {
    Frame {
        reward,
        done: false,
        info: Info::new(status, STANDING, 99),
    }
}

pub fn intro(reward: f64) -> Frame {
    Frame {
        reward,
        done: false,
        info: Info::new(STANDING, STANDING, NOT_STARTED),
    }
}

pub fn last(status: i64, reward: f64) -> Frame {
    Frame {
        done: true,
        ..frame(status, reward)
    }
}

#[derive(Debug, Clone)]
pub struct Script {
    pub frames: Vec<Frame>,
    /// Keep replaying the final frame once the script runs out.
    pub repeat_last: bool,
}

impl Script {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            repeat_last: false,
        }
    }

    pub fn forever(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            repeat_last: true,
        }
    }
}

/// Everything the stub saw, readable after the lobby drops it.
#[derive(Debug, Default)]
pub struct EmuLog {
    pub resets: usize,
    pub steps: Vec<Action>,
    pub renders: usize,
    pub closes: usize,
    pub players: usize,
}

pub type SharedLog = Arc<Mutex<EmuLog>>;

pub struct ScriptedEmulation {
    space: ActionSpace,
    script: Script,
    cursor: usize,
    log: SharedLog,
}

impl ScriptedEmulation {
    pub fn new(script: Script, players: usize, log: SharedLog) -> Self {
        log.lock().unwrap().players = players;
        Self {
            space: ActionSpace::genesis(players),
            script,
            cursor: 0,
            log,
        }
    }
}

impl Emulation for ScriptedEmulation {
    fn reset(&mut self) -> Result<Observation> {
        self.cursor = 0;
        self.log.lock().unwrap().resets += 1;
        Ok(vec![0])
    }

    fn step(&mut self, action: &Action) -> Result<StepOutcome> {
        self.log.lock().unwrap().steps.push(*action);
        let frame = match self.script.frames.get(self.cursor) {
            Some(f) => f.clone(),
            None if self.script.repeat_last && !self.script.frames.is_empty() => {
                self.script.frames[self.script.frames.len() - 1].clone()
            }
            None => bail!("script exhausted after {} frames", self.cursor),
        };
        self.cursor += 1;
        Ok(StepOutcome {
            observation: vec![self.cursor as u8],
            reward: frame.reward,
            done: frame.done,
            info: frame.info,
        })
    }

    fn action_space(&self) -> &ActionSpace {
        &self.space
    }

    fn render(&mut self) -> Result<()> {
        self.log.lock().unwrap().renders += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closes += 1;
    }
}

/// Hands out a fresh scripted emulation per save state name.
#[derive(Default)]
pub struct ScriptedFactory {
    scripts: HashMap<String, Script>,
    pub log: SharedLog,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, name: &str, script: Script) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }
}

impl EmulationFactory for ScriptedFactory {
    fn make(&self, state: &str, players: usize) -> Result<Box<dyn Emulation>> {
        match self.scripts.get(state) {
            Some(script) => Ok(Box::new(ScriptedEmulation::new(
                script.clone(),
                players,
                Arc::clone(&self.log),
            ))),
            None => bail!("unknown save state `{state}`"),
        }
    }
}

pub fn press(space: &ActionSpace, buttons: &[&str]) -> Action {
    let idx: Vec<usize> = buttons.iter().map(|b| space.index_of(b).unwrap()).collect();
    Action::with_pressed(space.arity(), &idx).unwrap()
}
