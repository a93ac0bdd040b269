use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::classifier::ControlCodes;
use crate::lobby::LobbyMode;

// =============================================================================
// Frame Controller Knobs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Consecutive locked frames tolerated before the skip loop gives up.
    pub max_skip_frames: Option<u32>,
    pub render: bool,
    pub real_time: bool,
    /// Pacing rate for real-time playback.
    pub frame_rate_hz: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_skip_frames: Some(3_600),
            render: false,
            real_time: false,
            frame_rate_hz: 115.0,
        }
    }
}

impl ControllerConfig {
    pub fn frame_interval(&self) -> Duration {
        if self.frame_rate_hz > 0.0 {
            Duration::from_secs_f64(1.0 / self.frame_rate_hz)
        } else {
            Duration::ZERO
        }
    }
}

// =============================================================================
// Lobby Setup
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    pub game: String,
    pub mode: LobbyMode,
    pub roster: Vec<String>,
    pub buffer_capacity: usize,
    pub controller: ControllerConfig,
    pub codes: ControlCodes,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            game: "StreetFighterIISpecialChampionEdition-Genesis".to_string(),
            mode: LobbyMode::SinglePlayer,
            roster: Vec::new(),
            buffer_capacity: 100_000,
            controller: ControllerConfig::default(),
            codes: ControlCodes::default(),
        }
    }
}

impl LobbyConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open lobby config: {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let config: LobbyConfig = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse lobby config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid lobby config: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            bail!("buffer_capacity must be at least 1");
        }
        if !self.controller.frame_rate_hz.is_finite() || self.controller.frame_rate_hz < 0.0 {
            bail!(
                "frame_rate_hz must be a non-negative number, got {}",
                self.controller.frame_rate_hz
            );
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
