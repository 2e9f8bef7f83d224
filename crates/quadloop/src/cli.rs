use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::paths::ENV_SHADER_DIR;

#[derive(Parser, Debug)]
#[command(
    name = "quadloop",
    author,
    version,
    about = "Full-screen shader loop with hot reload",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Loop configuration TOML (defaults to `<config dir>/quadloop.toml` when present).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding `<name>.vert` / `<name>.frag` pairs.
    #[arg(long, env = ENV_SHADER_DIR, value_name = "DIR")]
    pub shader_dir: Option<PathBuf>,

    /// Window size (e.g. `800x600`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = loopconfig::parse_size)]
    pub size: Option<(u32, u32)>,

    /// Frames per second; overrides the configured frame interval.
    #[arg(long, value_name = "FPS", value_parser = parse_fps)]
    pub fps: Option<f32>,

    /// Time between shader switches (e.g. `5s`, `1m`).
    #[arg(long, value_name = "DURATION", value_parser = loopconfig::parse_duration)]
    pub rotate_every: Option<Duration>,

    /// Rotate through shaders in shuffled order.
    #[arg(long)]
    pub shuffle: bool,

    /// Write the first presented frame to this PNG path.
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Seed for shuffled rotation (defaults to the current time).
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print resolved config, data, and shader directories.
    Where,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_fps(value: &str) -> Result<f32, String> {
    let fps: f32 = value
        .trim()
        .parse()
        .map_err(|err| format!("invalid fps '{value}': {err}"))?;
    if !fps.is_finite() || fps <= 0.0 {
        return Err(format!("invalid fps '{value}': must be greater than zero"));
    }
    Ok(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "quadloop",
            "--size",
            "1280x720",
            "--fps",
            "60",
            "--rotate-every",
            "2s",
            "--shuffle",
            "--seed",
            "7",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.size, Some((1280, 720)));
        assert_eq!(cli.run.fps, Some(60.0));
        assert_eq!(cli.run.rotate_every, Some(Duration::from_secs(2)));
        assert!(cli.run.shuffle);
        assert_eq!(cli.run.seed, Some(7));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Cli::try_parse_from(["quadloop", "--size", "0x600"]).is_err());
        assert!(Cli::try_parse_from(["quadloop", "--fps", "0"]).is_err());
        assert!(Cli::try_parse_from(["quadloop", "--rotate-every", "soon"]).is_err());
    }

    #[test]
    fn parses_where_subcommand() {
        let cli = Cli::try_parse_from(["quadloop", "where"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Where)));
    }
}
