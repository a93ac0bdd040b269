// =============================================================================
// fight-lobby — frame-synchronised play and experience collection
// =============================================================================
// Build & Run:
//   cargo build --release
//   cargo run --release -- play  --rom game.nes --data data.json --states-dir states --state ryu
//   cargo run --release -- train --rom game.nes --data data.json --states-dir states \
//       --state ryu --state chunli --episodes 10 --dump runs/
//   cargo run --release -- baseline --rom game.nes --data data.json --states-dir states --state ryu

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use fight_lobby::{
    ComboPlayer, GameData, Lobby, LobbyConfig, LobbyMode, NesFactory, Player, RandomPlayer,
};

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "fight-lobby", about = "Fighting-game emulation lobby — play and collect transitions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a decision-maker play through the roster once
    Play(PlayArgs),
    /// Collect experience over several episodes
    Train(TrainArgs),
    /// Random decision-maker, headless, reward per save state
    Baseline(BaselineArgs),
}

#[derive(Args)]
struct EmuArgs {
    #[arg(long)]
    rom: PathBuf,
    /// JSON RAM map with reward and done rules
    #[arg(long)]
    data: PathBuf,
    #[arg(long, default_value = "states")]
    states_dir: PathBuf,
    /// Save state names making up the roster (overrides the config file)
    #[arg(long = "state")]
    states: Vec<String>,
    /// Lobby config JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Cap on consecutive locked frames skipped per decision (0 disables the cap)
    #[arg(long)]
    max_skip_frames: Option<u32>,
}

impl EmuArgs {
    fn lobby_config(&self) -> Result<LobbyConfig> {
        let mut config = match &self.config {
            Some(path) => LobbyConfig::load(path)?,
            None => LobbyConfig::default(),
        };
        if !self.states.is_empty() {
            config.roster = self.states.clone();
        }
        if let Some(cap) = self.max_skip_frames {
            config.controller.max_skip_frames = (cap > 0).then_some(cap);
        }
        config.validate()?;
        Ok(config)
    }

    fn factory(&self, headless: bool) -> Result<NesFactory> {
        let data = GameData::load(&self.data)?;
        Ok(NesFactory::new(self.rom.clone(), self.states_dir.clone(), data).with_headless(headless))
    }
}

#[derive(Args)]
struct PlayArgs {
    #[command(flatten)]
    emu: EmuArgs,
    #[arg(long, default_value_t = false)]
    real_time: bool,
    #[arg(long, default_value_t = false)]
    no_render: bool,
    /// Throw scripted special moves instead of random inputs
    #[arg(long, default_value_t = false)]
    combo: bool,
    /// Seat a second random player (two-player emulation)
    #[arg(long, default_value_t = false)]
    versus: bool,
}

#[derive(Args)]
struct TrainArgs {
    #[command(flatten)]
    emu: EmuArgs,
    #[arg(long, default_value = "1")]
    episodes: usize,
    /// Directory for per-episode transition dumps
    #[arg(long)]
    dump: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    no_review: bool,
    #[arg(long, default_value_t = false)]
    combo: bool,
    #[arg(long, default_value_t = false)]
    render: bool,
    #[arg(long, default_value_t = false)]
    real_time: bool,
}

#[derive(Args)]
struct BaselineArgs {
    #[command(flatten)]
    emu: EmuArgs,
    #[arg(long, default_value = "3")]
    episodes: usize,
}

fn make_player(combo: bool, capacity: usize, dump: Option<&PathBuf>) -> Box<dyn Player> {
    if combo {
        let player = ComboPlayer::new(capacity, Vec::new());
        match dump {
            Some(dir) => Box::new(player.with_dump_dir(dir)),
            None => Box::new(player),
        }
    } else {
        let player = RandomPlayer::new(capacity);
        match dump {
            Some(dir) => Box::new(player.with_dump_dir(dir)),
            None => Box::new(player),
        }
    }
}

// =============================================================================
// Play
// =============================================================================

fn play(args: &PlayArgs) -> Result<()> {
    eprintln!("═══════════════════════════════════════════════════════════");
    eprintln!("  PLAYING — fight-lobby");
    eprintln!("═══════════════════════════════════════════════════════════");

    let mut config = args.emu.lobby_config()?;
    config.controller.render = !args.no_render;
    if args.versus {
        config.mode = LobbyMode::TwoPlayer;
    }
    let capacity = config.buffer_capacity;
    let roster = config.roster.clone();
    let mut lobby = Lobby::new(args.emu.factory(args.no_render)?, config);
    lobby.add_player(make_player(args.combo, capacity, None))?;
    if args.versus {
        lobby.add_player(Box::new(RandomPlayer::new(capacity)))?;
    }

    for state in &roster {
        let summary = lobby.play(state, args.real_time)?;
        eprintln!(
            "{state}: decisions={}, frames={}, reward={:.1}, capped={}",
            summary.decisions, summary.frames, summary.total_reward, summary.capped
        );
    }
    Ok(())
}

// =============================================================================
// Train
// =============================================================================

fn train(args: &TrainArgs) -> Result<()> {
    eprintln!("═══════════════════════════════════════════════════════════");
    eprintln!("  COLLECTING — fight-lobby");
    eprintln!("═══════════════════════════════════════════════════════════");

    let mut config = args.emu.lobby_config()?;
    config.mode = LobbyMode::SinglePlayer;
    config.controller.render = args.render;
    let capacity = config.buffer_capacity;
    let mut lobby = Lobby::new(args.emu.factory(!args.render)?, config);
    lobby.add_player(make_player(args.combo, capacity, args.dump.as_ref()))?;

    eprintln!(
        "Roster: {} | Episodes: {} | Buffer: {capacity}",
        lobby.roster().join(", "),
        args.episodes
    );
    let summary = lobby.execute_training_run(args.episodes, !args.no_review, args.real_time)?;
    eprintln!(
        "\n✅ Done. {} episodes, {} decisions, total reward {:.1}",
        summary.episodes,
        summary.decisions(),
        summary.total_reward()
    );
    Ok(())
}

// =============================================================================
// Random Baseline
// =============================================================================

fn baseline(args: &BaselineArgs) -> Result<()> {
    eprintln!("Running random decision-maker baseline...");

    let mut config = args.emu.lobby_config()?;
    config.mode = LobbyMode::SinglePlayer;
    config.controller.render = false;
    let capacity = config.buffer_capacity;
    let mut lobby = Lobby::new(args.emu.factory(true)?, config);
    lobby.add_player(Box::new(RandomPlayer::new(capacity)))?;

    let summary = lobby.execute_training_run(args.episodes, false, false)?;
    for state in lobby.roster() {
        let rewards: Vec<f64> = summary
            .matches
            .iter()
            .filter(|m| &m.state == state)
            .map(|m| m.total_reward)
            .collect();
        if rewards.is_empty() {
            continue;
        }
        let mean = rewards.iter().sum::<f64>() / rewards.len() as f64;
        let max = rewards.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        eprintln!("{state}: mean={mean:.1}, max={max:.1}");
    }
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Play(args) => play(args),
        Commands::Train(args) => train(args),
        Commands::Baseline(args) => baseline(args),
    }
}
