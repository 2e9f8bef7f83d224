//! Render scheduler: one dedicated thread that owns the [`RenderSession`] and
//! drives it from two timers.
//!
//! ```text
//!   start(factory) ──spawn──▶ render thread
//!                               │ factory(SharedState) + attach_shaders
//!          ◀──── ready ─────────┤
//!                               ▼
//!                  select! { shutdown | frame tick | rotation tick }
//!                               │            │             │
//!                            cleanup     time + tick()  select next key
//! ```
//!
//! The session never leaves the render thread; callers talk to it through the
//! [`SharedState`] handle and stop it with [`RenderScheduler::stop`].
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, never, select, tick, Receiver, Sender};
use loopconfig::{FaultPolicy, LoopConfig, RotationMode};
use parking_lot::Mutex;
use rand::prelude::*;
use renderer::{
    FrameOutcome, GraphicsDriver, RenderSession, SessionError, ShaderEntry, ShaderKey,
    SharedState, Surface,
};
use tracing::{debug, error, info, warn};

/// Uniform carrying seconds since the render loop started.
pub const TIME_UNIFORM: &str = "time";

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("render scheduler was already started")]
    AlreadyStarted,
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("render session failed to start: {0}")]
    Startup(#[source] SessionError),
    #[error("render loop stopped: {0}")]
    Render(#[source] SessionError),
    #[error("render thread panicked")]
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub frame_interval: Duration,
    pub rotation_interval: Duration,
    /// Attached in order on the render thread before the loop starts.
    pub shaders: Vec<ShaderEntry>,
    pub rotation: RotationMode,
    pub fault_policy: FaultPolicy,
    pub seed: u64,
    /// Where to write the first presented frame as a PNG.
    pub snapshot: Option<PathBuf>,
}

impl SchedulerConfig {
    pub fn from_config(config: &LoopConfig, seed: u64) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            rotation_interval: config.rotation_interval(),
            shaders: config
                .shaders
                .iter()
                .map(|item| ShaderEntry::new(item.key.as_str(), item.file()))
                .collect(),
            rotation: config.rotation,
            fault_policy: config.on_shader_fault,
            seed,
            snapshot: None,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_config(&LoopConfig::default(), 0)
    }
}

pub struct RenderScheduler {
    config: SchedulerConfig,
    shared: SharedState,
    state: Arc<Mutex<SchedulerState>>,
    shutdown: Option<Sender<()>>,
    exited: Option<Receiver<()>>,
    handle: Option<JoinHandle<Result<(), SchedulerError>>>,
}

impl RenderScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            shared: SharedState::new(),
            state: Arc::new(Mutex::new(SchedulerState::Idle)),
            shutdown: None,
            exited: None,
            handle: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Handle for writing uniforms and switching shaders from other threads.
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Disconnects once the render thread has finished, whether it was
    /// stopped or ended on its own.
    pub fn exited(&self) -> Receiver<()> {
        self.exited.clone().unwrap_or_else(never)
    }

    /// Spawns the render thread, builds the session there with `factory`,
    /// attaches the configured shaders and starts the loop.
    ///
    /// Returns once the session is ready, or with the error that prevented it.
    pub fn start<F, D, S>(&mut self, factory: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(SharedState) -> Result<RenderSession<D, S>, SessionError> + Send + 'static,
        D: GraphicsDriver + 'static,
        S: Surface + 'static,
    {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Idle {
                return Err(SchedulerError::AlreadyStarted);
            }
            *state = SchedulerState::Running;
        }

        let (ready_tx, ready_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (exit_tx, exit_rx) = bounded::<()>(0);
        let config = self.config.clone();
        let shared = self.shared.clone();
        let state = Arc::clone(&self.state);

        let spawned = thread::Builder::new()
            .name("quadloop-render".into())
            .spawn(move || {
                let _exit_guard = exit_tx;
                let result = run_render_thread(factory, config, shared, ready_tx, shutdown_rx);
                *state.lock() = SchedulerState::Stopped;
                result
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                *self.state.lock() = SchedulerState::Stopped;
                return Err(SchedulerError::Spawn(err));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.shutdown = Some(shutdown_tx);
                self.exited = Some(exit_rx);
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                *self.state.lock() = SchedulerState::Stopped;
                Err(SchedulerError::Startup(err))
            }
            Err(_) => {
                let _ = handle.join();
                *self.state.lock() = SchedulerState::Stopped;
                Err(SchedulerError::Panicked)
            }
        }
    }

    /// Signals the render thread to stop and waits for it.
    ///
    /// Returns the error that ended the loop, if it ended on a fatal fault.
    /// Calling it again, or before `start`, does nothing.
    pub fn stop(&mut self) -> Result<(), SchedulerError> {
        let Some(handle) = self.handle.take() else {
            let mut state = self.state.lock();
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Stopped;
            }
            return Ok(());
        };

        {
            let mut state = self.state.lock();
            if *state == SchedulerState::Running {
                *state = SchedulerState::Stopping;
            }
        }
        // dropping the sender disconnects the shutdown channel
        self.shutdown.take();
        let result = handle.join().map_err(|_| SchedulerError::Panicked);
        *self.state.lock() = SchedulerState::Stopped;
        info!("render scheduler stopped");
        result?
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("render scheduler ended with error: {err}");
        }
    }
}

fn run_render_thread<F, D, S>(
    factory: F,
    config: SchedulerConfig,
    shared: SharedState,
    ready_tx: Sender<Result<(), SessionError>>,
    shutdown_rx: Receiver<()>,
) -> Result<(), SchedulerError>
where
    F: FnOnce(SharedState) -> Result<RenderSession<D, S>, SessionError>,
    D: GraphicsDriver,
    S: Surface,
{
    let session = factory(shared.clone()).and_then(|mut session| {
        session.attach_shaders(&config.shaders)?;
        Ok(session)
    });
    let mut session = match session {
        Ok(session) => session,
        Err(err) => {
            error!("failed to start render session: {err}");
            let _ = ready_tx.send(Err(err));
            return Ok(());
        }
    };

    let frame_ticker = tick(config.frame_interval);
    let rotation_ticker = tick(config.rotation_interval);
    let mut rotation = Rotation::new(config.rotation, config.seed);
    let mut faults = FaultLog::default();
    let mut snapshot = config.snapshot.clone();
    if snapshot.is_some() {
        session.capture_next_frame();
    }

    let started = Instant::now();
    let _ = ready_tx.send(Ok(()));
    info!(
        shaders = config.shaders.len(),
        frame_ms = config.frame_interval.as_millis() as u64,
        rotate_ms = config.rotation_interval.as_millis() as u64,
        "render loop running"
    );

    let result = loop {
        select! {
            recv(shutdown_rx) -> _ => {
                debug!("shutdown requested");
                break Ok(());
            }
            recv(frame_ticker) -> _ => {
                shared.set_uniform(TIME_UNIFORM, started.elapsed().as_secs_f32());
                match session.tick() {
                    FrameOutcome::Presented => faults.clear(),
                    FrameOutcome::ShouldStop => {
                        info!("window closed; stopping render loop");
                        break Ok(());
                    }
                    FrameOutcome::ShaderFault(err) => match config.fault_policy {
                        FaultPolicy::KeepPrevious => faults.report(&err),
                        FaultPolicy::Abort => {
                            error!("shader fault: {err}");
                            break Err(SchedulerError::Render(err));
                        }
                    },
                    FrameOutcome::Fatal(err) => {
                        error!("render loop failed: {err}");
                        break Err(SchedulerError::Render(err));
                    }
                }
                if let Some(path) = snapshot.as_ref() {
                    if let Some(image) = session.take_capture() {
                        match image.save(path) {
                            Ok(()) => info!(path = %path.display(), "saved snapshot"),
                            Err(err) => warn!(path = %path.display(), "failed to save snapshot: {err}"),
                        }
                        snapshot = None;
                    } else if !session.capture_pending() {
                        warn!(path = %path.display(), "frame capture failed; skipping snapshot");
                        snapshot = None;
                    }
                }
            }
            recv(rotation_ticker) -> _ => {
                let keys = shared.shader_keys();
                let current = shared.current_shader();
                if let Some(next) = rotation.next(&keys, current.as_ref()) {
                    match session.select_shader(next.as_str()) {
                        Ok(()) => info!(key = %next, "rotated shader"),
                        Err(err) => warn!(key = %next, "rotation failed: {err}"),
                    }
                }
            }
        }
    };

    drop(frame_ticker);
    drop(rotation_ticker);
    session.cleanup();
    result
}

/// Remembers the last shader fault so an unchanged fault is logged once.
#[derive(Debug, Default)]
struct FaultLog {
    last: Option<String>,
}

impl FaultLog {
    fn report(&mut self, err: &SessionError) {
        let message = err.to_string();
        if self.last.as_deref() != Some(message.as_str()) {
            warn!("shader reload failed; keeping previous pipeline: {message}");
            self.last = Some(message);
        }
    }

    fn clear(&mut self) {
        if self.last.take().is_some() {
            info!("shader builds again");
        }
    }
}

/// Picks the key the rotation timer switches to.
pub struct Rotation {
    mode: RotationMode,
    source: Vec<ShaderKey>,
    order: Vec<ShaderKey>,
    rng: StdRng,
}

impl Rotation {
    pub fn new(mode: RotationMode, seed: u64) -> Self {
        Self {
            mode,
            source: Vec::new(),
            order: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The key after `current` in the rotation order, or `None` when there
    /// is nothing to rotate between.
    pub fn next(&mut self, keys: &[ShaderKey], current: Option<&ShaderKey>) -> Option<ShaderKey> {
        if keys.len() < 2 {
            return None;
        }
        if self.source != keys {
            self.source = keys.to_vec();
            self.order = build_order(keys, self.mode, &mut self.rng);
        }

        let position = current.and_then(|key| self.order.iter().position(|k| k == key));
        let index = match position {
            Some(index) if index + 1 < self.order.len() => index + 1,
            Some(_) => {
                if self.mode == RotationMode::Shuffle {
                    self.order = build_order(keys, self.mode, &mut self.rng);
                    // never repeat the shader that just finished the cycle
                    if current == self.order.first() {
                        self.order.swap(0, 1);
                    }
                }
                0
            }
            None => 0,
        };
        Some(self.order[index].clone())
    }
}

fn build_order(keys: &[ShaderKey], mode: RotationMode, rng: &mut StdRng) -> Vec<ShaderKey> {
    let mut order = keys.to_vec();
    match mode {
        RotationMode::RoundRobin => {}
        RotationMode::Shuffle => {
            order.shuffle(rng);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::testing::{HeadlessSurface, RecordingDriver, UniformValue};
    use renderer::SessionConfig;
    use crossbeam_channel::RecvTimeoutError;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    const VERT: &str = "attribute vec3 position;\nvoid main() { gl_Position = vec4(position, 1.0); }\n";
    const FRAG: &str = "uniform vec2 resolution;\nuniform float time;\nvoid main() {}\n";

    fn keys(names: &[&str]) -> Vec<ShaderKey> {
        names.iter().map(|name| ShaderKey::new(*name)).collect()
    }

    fn shader_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in ["basic", "slate-1"] {
            fs::write(dir.path().join(format!("{name}.vert")), VERT).unwrap();
            fs::write(dir.path().join(format!("{name}.frag")), FRAG).unwrap();
        }
        dir
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            frame_interval: Duration::from_millis(2),
            rotation_interval: Duration::from_secs(3600),
            ..SchedulerConfig::default()
        }
    }

    type Factory = Box<
        dyn FnOnce(SharedState) -> Result<RenderSession<RecordingDriver, HeadlessSurface>, SessionError>
            + Send,
    >;

    fn headless(dir: &TempDir, driver: &RecordingDriver, surface: &HeadlessSurface) -> Factory {
        let config = SessionConfig {
            shader_root: dir.path().to_path_buf(),
            ..SessionConfig::default()
        };
        let driver = driver.clone();
        let surface = surface.clone();
        Box::new(move |shared| RenderSession::from_parts(driver, surface, &config, shared))
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn round_robin_wraps_between_two_shaders() {
        let keys = keys(&["basic", "slate-1"]);
        let mut rotation = Rotation::new(RotationMode::RoundRobin, 1);
        let mut current = keys[0].clone();
        let mut seen = Vec::new();
        for _ in 0..4 {
            current = rotation.next(&keys, Some(&current)).unwrap();
            seen.push(current.to_string());
        }
        assert_eq!(seen, ["slate-1", "basic", "slate-1", "basic"]);
    }

    #[test]
    fn rotation_needs_two_shaders() {
        let mut rotation = Rotation::new(RotationMode::RoundRobin, 1);
        assert_eq!(rotation.next(&[], None), None);
        let single = keys(&["basic"]);
        assert_eq!(rotation.next(&single, Some(&single[0])), None);
    }

    #[test]
    fn shuffle_visits_every_shader_each_cycle() {
        let keys = keys(&["a", "b", "c", "d"]);
        let mut rotation = Rotation::new(RotationMode::Shuffle, 42);
        let mut current: Option<ShaderKey> = None;
        for _ in 0..5 {
            let mut cycle = HashSet::new();
            for _ in 0..keys.len() {
                let next = rotation.next(&keys, current.as_ref()).unwrap();
                assert_ne!(Some(&next), current.as_ref());
                cycle.insert(next.clone());
                current = Some(next);
            }
            assert_eq!(cycle.len(), keys.len());
        }
    }

    #[test]
    fn builds_config_from_loop_config() {
        let config = SchedulerConfig::from_config(&LoopConfig::default(), 9);
        assert_eq!(config.frame_interval, Duration::from_millis(33));
        assert_eq!(config.rotation_interval, Duration::from_secs(5));
        assert_eq!(config.shaders[0], ShaderEntry::new("basic", "basic"));
        assert_eq!(config.shaders[1], ShaderEntry::new("slate-1", "slate-1"));
    }

    #[test]
    fn runs_frames_until_stopped() {
        let dir = shader_dir();
        let driver = RecordingDriver::new();
        let surface = HeadlessSurface::new();
        let mut scheduler = RenderScheduler::new(fast_config());
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.start(headless(&dir, &driver, &surface)).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(
            scheduler.shared().current_shader(),
            Some(ShaderKey::new("basic"))
        );
        assert!(wait_until(|| surface.presented() >= 3));

        scheduler.stop().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        scheduler.stop().unwrap();

        let log = driver.log();
        assert!(matches!(
            log.last_draw().unwrap().uniform(TIME_UNIFORM),
            Some(UniformValue::Float(_))
        ));
        assert_eq!(log.live_programs(), 0);
        assert_eq!(log.quads_deleted, 1);
    }

    #[test]
    fn second_start_is_rejected() {
        let dir = shader_dir();
        let driver = RecordingDriver::new();
        let surface = HeadlessSurface::new();
        let mut scheduler = RenderScheduler::new(fast_config());
        scheduler.start(headless(&dir, &driver, &surface)).unwrap();

        let err = scheduler
            .start(headless(&dir, &driver, &surface))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyStarted));
        scheduler.stop().unwrap();
    }

    #[test]
    fn startup_failure_is_reported() {
        let dir = shader_dir();
        fs::remove_file(dir.path().join("slate-1.frag")).unwrap();
        let driver = RecordingDriver::new();
        let surface = HeadlessSurface::new();
        let mut scheduler = RenderScheduler::new(fast_config());

        let err = scheduler
            .start(headless(&dir, &driver, &surface))
            .unwrap_err();
        match err {
            SchedulerError::Startup(SessionError::SourceNotFound { path, .. }) => {
                assert_eq!(path, dir.path().join("slate-1.frag"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(driver.log().live_programs(), 0);
    }

    #[test]
    fn window_close_ends_loop_cleanly() {
        let dir = shader_dir();
        let driver = RecordingDriver::new();
        let surface = HeadlessSurface::new();
        let mut scheduler = RenderScheduler::new(fast_config());
        scheduler.start(headless(&dir, &driver, &surface)).unwrap();
        let exited = scheduler.exited();

        surface.request_close();
        assert_eq!(
            exited.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        );
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        scheduler.stop().unwrap();
    }

    #[test]
    fn rotation_timer_switches_shader() {
        let dir = shader_dir();
        let driver = RecordingDriver::new();
        let surface = HeadlessSurface::new();
        let mut scheduler = RenderScheduler::new(SchedulerConfig {
            rotation_interval: Duration::from_millis(10),
            ..fast_config()
        });
        scheduler.start(headless(&dir, &driver, &surface)).unwrap();

        let shared = scheduler.shared().clone();
        assert!(wait_until(
            || shared.current_shader() == Some(ShaderKey::new("slate-1"))
        ));
        scheduler.stop().unwrap();
    }

    #[test]
    fn abort_policy_stops_on_broken_edit() {
        let dir = shader_dir();
        let driver = RecordingDriver::new();
        let surface = HeadlessSurface::new();
        let mut scheduler = RenderScheduler::new(SchedulerConfig {
            fault_policy: FaultPolicy::Abort,
            ..fast_config()
        });
        scheduler.start(headless(&dir, &driver, &surface)).unwrap();
        let exited = scheduler.exited();

        fs::write(dir.path().join("basic.frag"), "#error mid-edit\n").unwrap();
        assert_eq!(
            exited.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        );

        let err = scheduler.stop().unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Render(SessionError::Compile { .. })
        ));
    }

    #[test]
    fn keep_previous_policy_survives_broken_edit() {
        let dir = shader_dir();
        let driver = RecordingDriver::new();
        let surface = HeadlessSurface::new();
        let mut scheduler = RenderScheduler::new(fast_config());
        scheduler.start(headless(&dir, &driver, &surface)).unwrap();

        fs::write(dir.path().join("basic.frag"), "#error mid-edit\n").unwrap();
        let presented = surface.presented();
        assert!(wait_until(|| surface.presented() >= presented + 3));
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.stop().unwrap();
    }

    #[test]
    fn snapshot_writes_first_frame() {
        let dir = shader_dir();
        let out = TempDir::new().unwrap();
        let path = out.path().join("frame.png");
        let driver = RecordingDriver::new();
        let surface = HeadlessSurface::new();
        let mut scheduler = RenderScheduler::new(SchedulerConfig {
            snapshot: Some(path.clone()),
            ..fast_config()
        });
        scheduler.start(headless(&dir, &driver, &surface)).unwrap();

        assert!(wait_until(|| path.is_file() && surface.presented() >= 2));
        scheduler.stop().unwrap();
    }

    #[test]
    fn failed_snapshot_keeps_rendering() {
        let dir = shader_dir();
        let out = TempDir::new().unwrap();
        let path = out.path().join("frame.png");
        let driver = RecordingDriver::new();
        driver.log().fail_read_back = true;
        let surface = HeadlessSurface::new();
        let mut scheduler = RenderScheduler::new(SchedulerConfig {
            snapshot: Some(path.clone()),
            ..fast_config()
        });
        scheduler.start(headless(&dir, &driver, &surface)).unwrap();

        assert!(wait_until(|| surface.presented() >= 3));
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert!(!path.exists());
        scheduler.stop().unwrap();
    }
}
