use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{
    Config, FileConfig, GameSettings, Overrides, Preset, MAX_INCREMENT_SECONDS, MAX_MINUTES,
};
use crate::core::clock::TimeControl;
use crate::core::engine::Engine;
use crate::core::lobby::{role_for, validate_peer_id, ConnectionManager};
use crate::core::rules::{ChessRules, RulesEngine};
use crate::core::session::Session;
use crate::history::{JsonRecordStore, MemoryRecordStore, RecordStore};

#[derive(Parser)]
#[command(name = "lanchess")]
#[command(about = "♟️ Peer-to-peer chess in the terminal")]
#[command(version)]
pub struct Cli {
    /// Config file (default: <config dir>/lanchess/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Time control preset
    #[arg(short, long, global = true, value_enum)]
    pub preset: Option<Preset>,

    /// Minutes per side (turns the chosen preset into a custom control)
    #[arg(short, long, global = true)]
    pub minutes: Option<u32>,

    /// Seconds added after each move (turns the chosen preset into a custom control)
    #[arg(short, long, global = true)]
    pub increment: Option<u32>,

    /// Name shown to your opponent
    #[arg(short, long, global = true)]
    pub name: Option<String>,

    /// Game history file
    #[arg(long, global = true, conflicts_with = "no_history")]
    pub history: Option<PathBuf>,

    /// Keep finished games in memory only
    #[arg(long, global = true)]
    pub no_history: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Host a game and wait for an opponent (you play White)
    Host,
    /// Join a hosted game by its endpoint id (you play Black)
    Join {
        /// Endpoint id printed by the host
        id: String,
    },
    /// Browse or edit finished games
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List finished games, newest first
    List,
    /// Delete one game by id
    Delete { id: String },
    /// Delete every game
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

enum Target {
    Host,
    Join(String),
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            name: self.name.clone(),
            preset: self.preset,
            minutes: self.minutes,
            increment: self.increment,
            history: self.history.clone(),
            no_history: self.no_history,
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let file = FileConfig::discover(cli.config.as_deref()).context("failed to load config")?;
    let config = Config::resolve(file, &cli.overrides()).context("invalid configuration")?;
    init_logging(&config)?;

    match cli.command {
        Some(Commands::Host) => play(&config, Target::Host).await,
        Some(Commands::Join { id }) => play(&config, Target::Join(id)).await,
        Some(Commands::History { action }) => history(&config, action),
        None => show_main_menu(config).await,
    }
}

/// Log to a file; the terminal belongs to the board while a game runs.
fn init_logging(config: &Config) -> Result<()> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn open_store(config: &Config) -> Result<Box<dyn RecordStore + Send>> {
    match &config.history_path {
        Some(path) => {
            let store = JsonRecordStore::open(path)
                .with_context(|| format!("failed to open game history {}", path.display()))?;
            Ok(Box::new(store))
        }
        None => Ok(Box::new(MemoryRecordStore::new())),
    }
}

async fn play(config: &Config, target: Target) -> Result<()> {
    if let Target::Join(id) = &target {
        validate_peer_id(id)?;
    }
    let store = open_store(config)?;

    // The host plays White. The joiner's time control is replaced by the host's
    // once the handshake completes.
    let role = role_for(matches!(target, Target::Join(_)));
    let settings = GameSettings::online(config.time_control, role, &config.name, None);
    let mut session = Session::new(role, ChessRules::new(), settings, store);

    let mut manager = ConnectionManager::new(config.handshake_timeout);
    let local_id = manager
        .initialize()
        .await
        .context("failed to start networking")?;
    session.begin_connecting();

    let connected = match &target {
        Target::Host => {
            println!("🏠 Hosting {} ({:?})", config.time_control, config.preset);
            println!("Share this id with your opponent:");
            println!();
            println!("    {local_id}");
            println!();
            println!("⏳ Waiting for an opponent...");
            manager
                .accept(config.time_control, Some(config.name.clone()))
                .await
        }
        Target::Join(id) => {
            println!("🔗 Connecting to {}...", id.trim());
            manager.connect(id, Some(config.name.clone())).await
        }
    };
    let (link, handshake) = match connected {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "could not start a game");
            manager.close().await;
            return Err(e.into());
        }
    };
    if !session.connected(&handshake) {
        manager.close().await;
        bail!("handshake assigned {} but this side expected {role}", handshake.role);
    }
    info!(role = %role, opponent = %session.settings().name_of(role.opponent()), "starting game");

    let terminal = ratatui::init();
    let finished = Engine::new(session, link).run(terminal).await;
    ratatui::restore();
    manager.close().await;

    let session = finished?;
    match session.outcome() {
        Some(outcome) => println!("🏁 {}", outcome.result_text()),
        None => println!("Game left unfinished."),
    }
    let pgn = session.rules().export_history();
    if !pgn.is_empty() {
        println!("{pgn}");
    }
    Ok(())
}

fn history(config: &Config, action: HistoryAction) -> Result<()> {
    let mut store = open_store(config)?;

    match action {
        HistoryAction::List => print_history(store.as_ref()),
        HistoryAction::Delete { id } => {
            if !store.delete(&id)? {
                bail!("no game with id {id}");
            }
            println!("🗑️  Deleted {id}");
        }
        HistoryAction::Clear { yes } => {
            let confirmed = yes
                || Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("Delete every finished game?")
                    .default(false)
                    .interact()?;
            if confirmed {
                store.clear()?;
                println!("History cleared.");
            }
        }
    }
    Ok(())
}

fn print_history(store: &dyn RecordStore) {
    let records = store.list();
    if records.is_empty() {
        println!("No finished games yet.");
        return;
    }
    for record in records {
        let s = &record.settings;
        let players = format!("{} vs {} ({})", s.white_name, s.black_name, s.time_control);
        println!(
            "📦 {}  {}  {} moves  {}",
            record.date.format("%Y-%m-%d %H:%M"),
            record.result_text,
            record.move_count,
            players
        );
        println!("   id: {}", record.id);
        println!("   {}", record.pgn);
        println!();
    }
}

fn select_time_control(config: &mut Config) -> Result<()> {
    let presets = [Preset::Bullet, Preset::Blitz, Preset::Rapid, Preset::Custom];
    let labels = ["Bullet (1+1)", "Blitz (3+2)", "Rapid (15+10)", "Custom"];
    let default = presets.iter().position(|p| *p == config.preset).unwrap_or(1);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("⏱️  Time control")
        .items(&labels)
        .default(default)
        .interact()?;

    let preset = presets[selection];
    let (minutes, increment) = match preset.minutes_and_increment() {
        Some(pair) => pair,
        None => {
            let minutes: u32 = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Minutes per side")
                .default(5)
                .validate_with(|m: &u32| match *m {
                    0 => Err("at least 1 minute".to_string()),
                    m if m > MAX_MINUTES => Err(format!("at most {MAX_MINUTES} minutes")),
                    _ => Ok(()),
                })
                .interact_text()?;
            let increment: u32 = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Increment (seconds)")
                .default(0)
                .validate_with(|i: &u32| {
                    if *i <= MAX_INCREMENT_SECONDS {
                        Ok(())
                    } else {
                        Err(format!("at most {MAX_INCREMENT_SECONDS} seconds"))
                    }
                })
                .interact_text()?;
            (minutes, increment)
        }
    };
    config.preset = preset;
    config.time_control = TimeControl::new(minutes, increment);
    Ok(())
}

async fn show_main_menu(mut config: Config) -> Result<()> {
    println!("♟️  Welcome to lanchess!");
    println!("   Peer-to-peer chess in the terminal");
    println!();

    let options = vec![
        "🏠 Host a game",
        "🔗 Join a game",
        "📋 Game history",
        "🚪 Exit",
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("What would you like to do?")
        .items(&options)
        .interact()?;

    match selection {
        0 => {
            select_time_control(&mut config)?;
            play(&config, Target::Host).await
        }
        1 => {
            let id: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Host's endpoint id")
                .validate_with(|id: &String| validate_peer_id(id).map(|_| ()).map_err(|e| e.to_string()))
                .interact_text()?;
            play(&config, Target::Join(id)).await
        }
        2 => {
            let store = open_store(&config)?;
            print_history(store.as_ref());
            Ok(())
        }
        _ => {
            println!("👋 Goodbye!");
            Ok(())
        }
    }
}
