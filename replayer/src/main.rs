use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use replayer::aggregate::{aggregate, trajectories, StudyLayout};
use replayer::replay::replay_file;
use replayer::scoreboard::FileScoreboard;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay one session log and print its summary
    Replay {
        /// Session log to replay
        file: PathBuf,

        /// Directory holding score_static.txt and score_moving.txt
        #[arg(short, long, default_value = "Scoreboard")]
        scoreboard: PathBuf,
    },

    /// Average every participant's runs per game mode
    Aggregate(StudyArgs),

    /// Export camera, road and moving object paths of every run
    Trajectories(StudyArgs),
}

#[derive(Args, Debug)]
struct StudyArgs {
    /// Directory with one sub-directory per participant
    #[arg(short, long, default_value = "Monitorization")]
    root: PathBuf,

    /// Number of the first participant directory
    #[arg(short, long, default_value = "1")]
    first: u32,

    /// Number of participants
    #[arg(short, long)]
    participants: u32,

    /// Games played by each participant
    #[arg(long, default_value = "2")]
    runs: u32,
}

impl From<StudyArgs> for StudyLayout {
    fn from(args: StudyArgs) -> Self {
        StudyLayout::new(args.root, args.first, args.participants, args.runs)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    match Cli::parse().command {
        Command::Replay { file, scoreboard } => {
            let mut scoreboard = FileScoreboard::new(scoreboard);
            let fold = replay_file(&file, &mut scoreboard)?;
            if fold.skipped > 0 {
                warn!("{} fragments could not be decoded", fold.skipped);
            }
            match &fold.session {
                Some(session) => print_json(session)?,
                None => {
                    warn!("{} ended without an END event", file.display());
                    print_json(&fold)?;
                }
            }
        }
        Command::Aggregate(args) => {
            let summary = aggregate(&args.into())?;
            info!("\n{}", summary);
            print_json(&summary)?;
        }
        Command::Trajectories(args) => {
            print_json(&trajectories(&args.into())?)?;
        }
    }

    Ok(())
}
