mod bootstrap;
mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::{Command, RunArgs};
use loopconfig::LoopConfig;
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Where) => run_where(&cli.run),
        None => run::run(cli.run),
    }
}

fn run_where(args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config_file = args.config.clone().unwrap_or_else(|| paths.config_file());
    let shader_dir = match &args.shader_dir {
        Some(dir) => dir.clone(),
        None => paths.default_shader_dir(),
    };

    println!("Configuration directories:");
    println!("  config:     {}", paths.config_dir().display());
    println!("  data:       {}", paths.data_dir().display());
    println!("Loop configuration:");
    if config_file.is_file() {
        println!("  file:       {}", config_file.display());
    } else {
        println!("  file:       {} (missing; built-in)", config_file.display());
        let builtin = LoopConfig::default();
        let keys: Vec<_> = builtin.shaders.iter().map(|s| s.key.as_str()).collect();
        println!("  shaders:    {}", keys.join(", "));
    }
    println!("Shader root:");
    println!("  {}", shader_dir.display());
    Ok(())
}
