use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use quest_engine::prelude::*;

/// Host frame length in headless runs.
const FRAME: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "quest-studio", version, about = "Run a learner script against a quest headlessly")]
struct Args {
    /// Quest document (JSON).
    quest: PathBuf,
    /// Learner script.
    script: PathBuf,
    /// Pace steps at the debug interval.
    #[arg(long)]
    debug: bool,
    /// Log filter, e.g. `quest_engine=debug`. Overrides `RUST_LOG`.
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
    /// Print every frame as a JSON snapshot.
    #[arg(long)]
    json: bool,
    /// Sleep between frames instead of stepping a fixed clock.
    #[arg(long)]
    realtime: bool,
}

/// Prints frames and acknowledges every animation right away.
struct Console {
    json: bool,
    frames: u64,
}

impl Console {
    fn present(&mut self, driver: &mut Driver, event: &DriverEvent) -> Result<()> {
        match event {
            DriverEvent::Frame { state, highlighted_block_id, animation } => {
                self.frames += 1;
                if self.json {
                    println!("{}", serde_json::to_string(state)?);
                } else {
                    println!(
                        "  frame {:>5}  {:<11}  block {}",
                        self.frames,
                        format!("{animation:?}"),
                        highlighted_block_id.as_deref().unwrap_or("-"),
                    );
                }
                match animation {
                    Animation::Action | Animation::TeleportIn => driver.action_complete(),
                    Animation::TeleportOut => driver.teleport_complete(),
                    Animation::None => {}
                }
            }
            DriverEvent::Finished { success, state } => {
                if self.json {
                    println!("{}", serde_json::to_string(state)?);
                }
                println!();
                println!("  result   {:?}", state.result());
                println!("  success  {success}");
            }
        }
        Ok(())
    }
}

fn run(args: &Args) -> Result<bool> {
    let quest = Quest::load(&args.quest)?;
    let script = fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read script {}", args.script.display()))?;

    let loaded = Registry::with_builtin_games().load(&quest)?;
    log::debug!("contract: {:?}", loaded.contract);
    let config = if args.debug { DriverConfig::debug() } else { DriverConfig::default() };
    let mut driver = Driver::new(loaded.engine, quest.solution.clone(), config);
    let mut console = Console { json: args.json, frames: 0 };

    println!();
    println!("  quest {} ({}, level {})", quest.id, quest.game_type, quest.level);
    println!();

    let started = driver.run(&script);
    for event in driver.take_events() {
        console.present(&mut driver, &event)?;
    }
    if let Err(err) = started {
        log::error!("{err:#}");
        return Ok(false);
    }

    let mut clock = FrameClock::new();
    let mut success = false;
    while driver.status() != Status::Finished {
        let frame = if args.realtime {
            thread::sleep(FRAME);
            clock.tick()
        } else {
            clock.step(FRAME)
        };
        driver.tick(&frame);
        loop {
            let events = driver.take_events();
            if events.is_empty() {
                break;
            }
            for event in &events {
                if let DriverEvent::Finished { success: s, .. } = event {
                    success = *s;
                }
                console.present(&mut driver, event)?;
            }
        }
    }
    Ok(success)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(LoggingConfig { env_filter: args.log.clone(), ..LoggingConfig::default() });

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("quest-studio").chain(args.iter().copied()))
    }

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn positional_paths_and_flags() {
        let args = parse(&["q.json", "--debug", "s.js", "--log", "quest_engine=debug"]).unwrap();
        assert_eq!(args.quest, PathBuf::from("q.json"));
        assert_eq!(args.script, PathBuf::from("s.js"));
        assert!(args.debug);
        assert_eq!(args.log.as_deref(), Some("quest_engine=debug"));
        assert!(!args.json && !args.realtime);
    }

    #[test]
    fn missing_paths_are_rejected() {
        assert!(parse(&["q.json"]).is_err());
        assert!(parse(&["q.json", "s.js", "extra.js"]).is_err());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(parse(&["q.json", "s.js", "--fast"]).is_err());
        assert!(parse(&["q.json", "s.js", "--log"]).is_err());
    }
}
