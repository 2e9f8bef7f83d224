use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, select};
use loopconfig::{LoopConfig, RotationMode};
use renderer::{RenderSession, SessionConfig, Viewport};
use scheduler::{RenderScheduler, SchedulerConfig};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::install_stock_shaders;
use crate::cli::RunArgs;
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let (mut config, source) = load_config(&args, &paths)?;
    apply_overrides(&mut config, &args)?;
    let shader_root = resolve_shader_root(&args, &config, source.as_deref(), &paths)?;
    let seed = args.seed.unwrap_or_else(seed_from_time);
    tracing::debug!(
        config = ?source,
        shaders = %shader_root.display(),
        seed,
        "resolved quadloop settings"
    );

    let session_config = SessionConfig {
        shader_root,
        viewport: Viewport::new(config.width, config.height),
        title: config.title.clone(),
        ..SessionConfig::default()
    };
    let mut scheduler_config = SchedulerConfig::from_config(&config, seed);
    scheduler_config.snapshot = args.snapshot.clone();

    let (signal_tx, signal_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    })
    .context("failed to install signal handler")?;

    let mut scheduler = RenderScheduler::new(scheduler_config);
    scheduler
        .start(move |shared| RenderSession::create(&session_config, shared))
        .context("failed to start renderer")?;

    let exited = scheduler.exited();
    select! {
        recv(signal_rx) -> _ => tracing::info!("termination signal received; shutting down"),
        recv(exited) -> _ => tracing::debug!("render thread finished"),
    }

    scheduler.stop().context("render loop failed")?;
    Ok(())
}

/// Reads `--config`, else the default config file when it exists, else the
/// built-in configuration. Also returns the file the config came from.
pub fn load_config(args: &RunArgs, paths: &AppPaths) -> Result<(LoopConfig, Option<PathBuf>)> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => {
            let default = paths.config_file();
            if !default.is_file() {
                return Ok((LoopConfig::default(), None));
            }
            default
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = LoopConfig::from_toml_str(&raw)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    Ok((config, Some(path)))
}

/// Layers command-line flags over the loaded configuration.
pub fn apply_overrides(config: &mut LoopConfig, args: &RunArgs) -> Result<()> {
    if let Some((width, height)) = args.size {
        config.width = width;
        config.height = height;
    }
    if let Some(fps) = args.fps {
        config.frame_interval = Some(Duration::from_nanos((1e9 / f64::from(fps)).round() as u64));
    }
    if let Some(every) = args.rotate_every {
        config.rotation_interval = Some(every);
    }
    if args.shuffle {
        config.rotation = RotationMode::Shuffle;
    }
    config
        .validate()
        .context("invalid settings after applying command-line overrides")?;
    Ok(())
}

/// `--shader-dir` (or its env var) wins, then `shader_dir` from the config
/// file (relative to that file), then the data directory, which is seeded
/// with the stock shaders.
pub fn resolve_shader_root(
    args: &RunArgs,
    config: &LoopConfig,
    config_source: Option<&Path>,
    paths: &AppPaths,
) -> Result<PathBuf> {
    if let Some(dir) = &args.shader_dir {
        return Ok(dir.clone());
    }
    if let Some(dir) = &config.shader_dir {
        let base = config_source.and_then(Path::parent);
        return Ok(match base {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir.clone(),
        });
    }

    let dir = paths.default_shader_dir();
    let written = install_stock_shaders(&dir)?;
    if !written.is_empty() {
        tracing::info!(
            dir = %dir.display(),
            count = written.len(),
            "installed stock shaders"
        );
    }
    Ok(dir)
}

fn seed_from_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths_in(root: &Path) -> AppPaths {
        AppPaths::from_raw(root.join("config"), root.join("data"))
    }

    #[test]
    fn builtin_config_without_file() {
        let root = TempDir::new().unwrap();
        let (config, source) = load_config(&RunArgs::default(), &paths_in(root.path())).unwrap();
        assert!(source.is_none());
        assert_eq!(config.shaders.len(), 2);
    }

    #[test]
    fn default_config_file_is_picked_up() {
        let root = TempDir::new().unwrap();
        let paths = paths_in(root.path());
        fs::create_dir_all(paths.config_dir()).unwrap();
        fs::write(
            paths.config_file(),
            "version = 1\ntitle = \"desk\"\n\n[[shaders]]\nkey = \"basic\"\n",
        )
        .unwrap();

        let (config, source) = load_config(&RunArgs::default(), &paths).unwrap();
        assert_eq!(source, Some(paths.config_file()));
        assert_eq!(config.title, "desk");
    }

    #[test]
    fn invalid_config_names_the_file() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("bad.toml");
        fs::write(&path, "version = 2\n\n[[shaders]]\nkey = \"basic\"\n").unwrap();
        let args = RunArgs {
            config: Some(path.clone()),
            ..RunArgs::default()
        };

        let err = load_config(&args, &paths_in(root.path())).unwrap_err();
        assert!(format!("{err:#}").contains("bad.toml"));
        assert!(format!("{err:#}").contains("unsupported config version"));
    }

    #[test]
    fn overrides_replace_loaded_values() {
        let mut config = LoopConfig::default();
        let args = RunArgs {
            size: Some((320, 240)),
            fps: Some(50.0),
            rotate_every: Some(Duration::from_secs(2)),
            shuffle: true,
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args).unwrap();

        assert_eq!((config.width, config.height), (320, 240));
        assert_eq!(config.frame_interval(), Duration::from_millis(20));
        assert_eq!(config.rotation_interval(), Duration::from_secs(2));
        assert_eq!(config.rotation, RotationMode::Shuffle);
    }

    #[test]
    fn zero_rotation_override_is_rejected() {
        let mut config = LoopConfig::default();
        let args = RunArgs {
            rotate_every: Some(Duration::ZERO),
            ..RunArgs::default()
        };
        assert!(apply_overrides(&mut config, &args).is_err());
    }

    #[test]
    fn shader_root_precedence() {
        let root = TempDir::new().unwrap();
        let paths = paths_in(root.path());
        let config_file = root.path().join("etc/quadloop.toml");
        let mut config = LoopConfig::default();

        let explicit = RunArgs {
            shader_dir: Some(PathBuf::from("/srv/shaders")),
            ..RunArgs::default()
        };
        config.shader_dir = Some(PathBuf::from("glsl"));
        assert_eq!(
            resolve_shader_root(&explicit, &config, Some(&config_file), &paths).unwrap(),
            PathBuf::from("/srv/shaders")
        );
        assert_eq!(
            resolve_shader_root(&RunArgs::default(), &config, Some(&config_file), &paths)
                .unwrap(),
            root.path().join("etc/glsl")
        );

        config.shader_dir = None;
        let dir = resolve_shader_root(&RunArgs::default(), &config, None, &paths).unwrap();
        assert_eq!(dir, paths.default_shader_dir());
        assert!(dir.join("basic.frag").is_file());
        assert!(dir.join("slate-1.vert").is_file());
    }
}
