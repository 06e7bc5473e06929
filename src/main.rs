//! Racing companion CLI - gapless game music
//!
//! Loops audio files without gaps and drives the layered background music of
//! a racing game:
//! - main music that moves one stage on after every break
//! - break music looped between rounds
//! - transition cues when a break ends

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use tokio::sync::oneshot;

use racing_companion::cli::{Cli, Commands, Display, LoopArgs, MusicArgs};
use racing_companion::config::MusicConfig;
use racing_companion::event::EventHandler;
use racing_companion::music::{BackgroundMusic, GameEvent};
use racing_companion::sound::{
    try_create_backend, ForwardingMediaPlayer, LoopMediaPlayer, MediaBackend, MediaPlayer,
    PlayerResult, SoundSource,
};

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    match cli.command {
        Some(Commands::Loop(args)) => play_loop(args).await?,
        Some(Commands::Music(args)) => play_music(args).await?,
        Some(Commands::CheckConfig { config }) => {
            let (path, config) = resolve_config(config.as_deref())?;
            Display::show_config(path.as_deref(), &config);
        }
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
        }
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

/// Loads the configuration at `path`, or the user configuration, falling back
/// to the built-in demo when no user configuration exists.
fn resolve_config(path: Option<&Path>) -> Result<(Option<PathBuf>, MusicConfig)> {
    if let Some(path) = path {
        let config = MusicConfig::load(path)
            .with_context(|| format!("could not load {}", path.display()))?;
        return Ok((Some(path.to_path_buf()), config));
    }

    let path = MusicConfig::default_path()?;
    match MusicConfig::load(&path) {
        Ok(config) => Ok((Some(path), config)),
        Err(e) if e.is_not_found() => {
            tracing::debug!(path = %path.display(), "no user configuration, using demo");
            Ok((None, MusicConfig::silent_demo()))
        }
        Err(e) => Err(e).with_context(|| format!("could not load {}", path.display())),
    }
}

fn audio_backend() -> Result<Arc<dyn MediaBackend>> {
    match try_create_backend() {
        Some(backend) => Ok(backend as Arc<dyn MediaBackend>),
        None => bail!("no audio output device available"),
    }
}

/// Waits for an asynchronous preparation to finish.
async fn prepared(receiver: oneshot::Receiver<PlayerResult<()>>) -> Result<()> {
    receiver
        .await
        .context("preparation was abandoned")?
        .context("preparation failed")
}

/// Sleeps for `duration`, returning false if interrupted by Ctrl-C.
async fn wait(duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = tokio::signal::ctrl_c() => false,
    }
}

async fn play_loop(args: LoopArgs) -> Result<()> {
    let source = SoundSource::from_path(&args.path);
    source.validate()?;

    let leaf = ForwardingMediaPlayer::new(audio_backend()?, source)?;
    let music = LoopMediaPlayer::new(leaf)?;
    music.set_volume(args.volume).set_speed(args.speed);

    let (tx, rx) = oneshot::channel();
    music.prepare_async(move |result| {
        let _ = tx.send(result);
    })?;
    prepared(rx).await?;

    let length = music.current().duration().ok();
    Display::show_loop_started(&args.path, args.seconds, length);
    music.start()?;
    wait(Duration::from_secs(args.seconds)).await;

    let rotations = music.rotations();
    music.reset()?.release()?;
    Display::show_loop_finished(rotations);
    Ok(())
}

async fn play_music(args: MusicArgs) -> Result<()> {
    let (_, config) = resolve_config(args.config.as_deref())?;
    let music = BackgroundMusic::from_config(audio_backend()?, &config)
        .context("could not create the background music")?;

    let (tx, rx) = oneshot::channel();
    music.prepare_async(move |result| {
        let _ = tx.send(result);
    })?;
    prepared(rx).await?;

    let events = EventHandler::new();
    music.subscribe(&events, "music");
    let send = |round: u32, event: GameEvent| {
        Display::show_event(round, event);
        events.handle_subscribers(&event);
    };

    let round_length = Duration::from_secs(args.round_seconds);
    let break_length = Duration::from_secs(args.break_seconds);
    for round in 1..=args.rounds {
        if round == 1 {
            send(round, GameEvent::Start);
        } else {
            send(round, GameEvent::Continue);
            if let Some(interval) = music.last_transition_interval() {
                Display::show_transition_interval(interval);
            }
        }

        let last = round == args.rounds;
        if last {
            if !wait(round_length.mul_f32(0.75)).await {
                break;
            }
            send(round, GameEvent::HurryUp);
            wait(round_length.mul_f32(0.25)).await;
            break;
        }
        if !wait(round_length).await {
            break;
        }
        send(round, GameEvent::Break);
        if !wait(break_length).await {
            break;
        }
        send(round, GameEvent::TransitionIn);
        let lead = music
            .last_transition_interval()
            .unwrap_or(Duration::from_secs(1));
        if !wait(lead).await {
            break;
        }
    }

    send(args.rounds, GameEvent::Reset);
    send(args.rounds, GameEvent::Exit);
    events.clear_subscribers();
    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::parse_from(["racing-companion"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_music() {
        let cli = Cli::parse_from(["racing-companion", "music", "--rounds", "2"]);
        assert!(matches!(cli.command, Some(Commands::Music(MusicArgs { rounds: 2, .. }))));
    }

    #[test]
    fn test_resolve_explicit_config() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), MusicConfig::silent_demo().to_json_string().unwrap())
            .unwrap();
        let (path, config) = resolve_config(Some(file.path())).unwrap();
        assert_eq!(path.as_deref(), Some(file.path()));
        assert_eq!(config, MusicConfig::silent_demo());
    }

    #[test]
    fn test_resolve_missing_explicit_config() {
        let err = resolve_config(Some(Path::new("/nonexistent/music.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("could not load"));
    }

    #[tokio::test]
    async fn test_prepared_reports_failure() {
        let (tx, rx) = oneshot::channel();
        tx.send(Err(racing_companion::sound::PlayerError::Backend("gone".into())))
            .unwrap();
        assert!(prepared(rx).await.is_err());
    }

    #[tokio::test]
    async fn test_prepared_reports_dropped_sender() {
        let (tx, rx) = oneshot::channel::<PlayerResult<()>>();
        drop(tx);
        let err = prepared(rx).await.unwrap_err();
        assert!(err.to_string().contains("abandoned"));
    }
}
