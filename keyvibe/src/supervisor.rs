//! Child process supervision
//!
//! The controller runs two children joined by a pipe:
//!
//! ```text
//! keyvibe-input --stdout--> keyvibe-audio <keyboard config.json> ...
//! ```
//!
//! `keyvibe-audio` runs with the keyboard pack directory as its working
//! directory. Applying a new pack selection stops both children and starts
//! them again with the new arguments.
//!
//! Stopping a child can wait up to `STOP_GRACE`, so supervision runs on its
//! own blocking thread and is told to shut down over a channel.

use keyvibe_audio::config::EngineArgs;
use keyvibe_audio::playback::PackSet;
use keyvibe_audio::reload::{PackSelection, ReloadCoordinator, ReloadTarget};
use keyvibe_audio::{Error, Result};
use keyvibe_common::{RuntimeFlags, RuntimeStateChannel};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Input capture binary
pub const INPUT_BINARY: &str = "keyvibe-input";

/// Playback engine binary
pub const AUDIO_BINARY: &str = "keyvibe-audio";

/// How long a child gets to exit after SIGTERM before it is killed
const STOP_GRACE: Duration = Duration::from_secs(2);

/// How often reloads and child exits are checked
pub const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);

/// Paths of the two child executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildBinaries {
    pub input: PathBuf,
    pub audio: PathBuf,
}

impl ChildBinaries {
    /// Binaries installed next to the running executable, or looked up in
    /// `PATH` when they are not there.
    pub fn discover() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        let find = |name: &str| {
            exe_dir
                .as_ref()
                .map(|dir| dir.join(name))
                .filter(|path| path.is_file())
                .unwrap_or_else(|| PathBuf::from(name))
        };

        Self {
            input: find(INPUT_BINARY),
            audio: find(AUDIO_BINARY),
        }
    }
}

/// Which child stopped on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRole {
    Input,
    Audio,
}

impl fmt::Display for ChildRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildRole::Input => f.write_str(INPUT_BINARY),
            ChildRole::Audio => f.write_str(AUDIO_BINARY),
        }
    }
}

/// Arguments and working directory of one launch of the playback engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub args: EngineArgs,
    pub workdir: PathBuf,
}

struct Children {
    input: Child,
    audio: Child,
}

/// Starts, restarts and stops the two children
pub struct ChildSupervisor {
    binaries: ChildBinaries,
    channel: RuntimeStateChannel,
    defaults: RuntimeFlags,
    verbose: bool,
    children: Option<Children>,
    last_launch: Option<Launch>,
}

impl ChildSupervisor {
    /// # Arguments
    /// - `binaries`: Executables to start
    /// - `channel`: Runtime flags, read at each launch so a restarted engine
    ///   starts in the state the user left it
    /// - `defaults`: Flags used where no flag file exists
    /// - `verbose`: Pass debug logging on to the playback engine
    pub fn new(
        binaries: ChildBinaries,
        channel: RuntimeStateChannel,
        defaults: RuntimeFlags,
        verbose: bool,
    ) -> Self {
        Self {
            binaries,
            channel,
            defaults,
            verbose,
            children: None,
            last_launch: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.children.is_some()
    }

    pub fn last_launch(&self) -> Option<&Launch> {
        self.last_launch.as_ref()
    }

    /// Engine launch for `selection`, using the descriptors `packs` were
    /// loaded from.
    ///
    /// # Errors
    /// `Error::Config` when the keyboard pack has no descriptor
    pub fn launch_for(&self, selection: &PackSelection, packs: &PackSet) -> Result<Launch> {
        let keyboard = packs
            .keyboard
            .descriptor()
            .ok_or_else(|| Error::Config("Keyboard sound pack has no descriptor".to_string()))?;
        let workdir = keyboard
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                Error::Config(format!("No pack directory for {}", keyboard.display()))
            })?;

        let flags = self.channel.read_with_defaults(&self.defaults);
        let mut args = EngineArgs::new(keyboard);
        args.keyboard_volume = i64::from(selection.keyboard_volume);
        args.mouse_volume = i64::from(selection.mouse_volume);
        args.verbose = i64::from(self.verbose);
        args.mute = i64::from(flags.global_mute);
        args.mouse_config = packs
            .mouse
            .descriptor()
            .map(|path| path.display().to_string());
        args.keyboard_mute = i64::from(flags.keyboard_mute);
        args.mouse_mute = i64::from(flags.mouse_mute);
        args.keyboard_enabled = i64::from(flags.keyboard_enabled);
        args.mouse_enabled = i64::from(flags.mouse_enabled);

        Ok(Launch { args, workdir })
    }

    /// Start both children for `launch`, stopping any running pair first.
    ///
    /// When the new pair fails to start the previous launch is started
    /// again, and the original error is returned.
    pub fn restart(&mut self, launch: Launch) -> Result<()> {
        self.stop();

        match self.start(&launch) {
            Ok(children) => {
                self.children = Some(children);
                self.last_launch = Some(launch);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to start children: {}", e);
                if let Some(previous) = self.last_launch.clone() {
                    match self.start(&previous) {
                        Ok(children) => {
                            info!("Restarted previous configuration");
                            self.children = Some(children);
                        }
                        Err(e) => warn!("Failed to restart previous configuration: {}", e),
                    }
                }
                Err(e)
            }
        }
    }

    fn start(&self, launch: &Launch) -> Result<Children> {
        debug!(
            "Starting {} | {} {}",
            self.binaries.input.display(),
            self.binaries.audio.display(),
            launch.args.to_args().join(" ")
        );

        let mut input = Command::new(&self.binaries.input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Config(format!(
                    "Cannot start {}: {}",
                    self.binaries.input.display(),
                    e
                ))
            })?;

        let Some(feed) = input.stdout.take() else {
            terminate(&mut input);
            return Err(Error::Config(format!("No output pipe from {}", INPUT_BINARY)));
        };

        let audio = Command::new(&self.binaries.audio)
            .args(launch.args.to_args())
            .current_dir(&launch.workdir)
            .stdin(Stdio::from(feed))
            .spawn();

        match audio {
            Ok(audio) => {
                info!(
                    "Started {} (pid {}) and {} (pid {})",
                    INPUT_BINARY,
                    input.id(),
                    AUDIO_BINARY,
                    audio.id()
                );
                Ok(Children { input, audio })
            }
            Err(e) => {
                terminate(&mut input);
                Err(Error::Config(format!(
                    "Cannot start {}: {}",
                    self.binaries.audio.display(),
                    e
                )))
            }
        }
    }

    /// Stop both children and wait for them
    pub fn stop(&mut self) {
        if let Some(mut children) = self.children.take() {
            terminate(&mut children.audio);
            terminate(&mut children.input);
            debug!("Children stopped");
        }
    }

    /// Check whether a child exited on its own. If one did, the other is
    /// stopped too and the exited one is reported.
    pub fn poll_exit(&mut self) -> Option<(ChildRole, ExitStatus)> {
        let children = self.children.as_mut()?;

        let exited = match children.audio.try_wait() {
            Ok(Some(status)) => Some((ChildRole::Audio, status)),
            Ok(None) => match children.input.try_wait() {
                Ok(Some(status)) => Some((ChildRole::Input, status)),
                Ok(None) => None,
                Err(e) => {
                    warn!("Cannot query {}: {}", ChildRole::Input, e);
                    None
                }
            },
            Err(e) => {
                warn!("Cannot query {}: {}", ChildRole::Audio, e);
                None
            }
        };

        if exited.is_some() {
            self.stop();
        }
        exited
    }
}

impl ReloadTarget for ChildSupervisor {
    fn apply(&mut self, selection: &PackSelection, packs: PackSet) -> Result<()> {
        let launch = self.launch_for(selection, &packs)?;
        self.restart(launch)
    }
}

impl Drop for ChildSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Why supervision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    Shutdown,
    ChildExited(ChildRole, ExitStatus),
    /// A restart failed and nothing is running
    NotRunning,
}

/// Poll for reloads and child exits every `interval` until a message (or
/// hangup) arrives on `shutdown`. Blocks; the children are stopped before
/// it returns.
pub fn supervise(
    mut coordinator: ReloadCoordinator<ChildSupervisor>,
    shutdown: Receiver<()>,
    interval: Duration,
) -> SupervisorExit {
    let exit = loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break SupervisorExit::Shutdown,
        }

        coordinator.poll();
        if let Some((role, status)) = coordinator.target_mut().poll_exit() {
            warn!("{} exited ({}), shutting down", role, status);
            break SupervisorExit::ChildExited(role, status);
        }
        if !coordinator.target().is_running() {
            error!("Child processes are not running");
            break SupervisorExit::NotRunning;
        }
    };

    coordinator.target_mut().stop();
    exit
}

/// Run `supervise` on the blocking pool until `shutdown` resolves or the
/// children stop on their own.
pub async fn supervise_until<F>(
    coordinator: ReloadCoordinator<ChildSupervisor>,
    shutdown: F,
) -> std::result::Result<SupervisorExit, JoinError>
where
    F: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = mpsc::channel();
    let mut handle =
        tokio::task::spawn_blocking(move || supervise(coordinator, stop_rx, SUPERVISE_INTERVAL));

    tokio::select! {
        joined = &mut handle => joined,
        _ = shutdown => {
            // The thread may have finished already
            let _ = stop_tx.send(());
            handle.await
        }
    }
}

/// SIGTERM, then SIGKILL once the grace period runs out; always reaps
fn terminate(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    send_term(child);
    let deadline = Instant::now() + STOP_GRACE;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => std::thread::sleep(Duration::from_millis(10)),
            Err(_) => break,
        }
    }

    if let Err(e) = child.kill() {
        debug!("Kill of pid {} failed: {}", child.id(), e);
    }
    let _ = child.wait();
}

#[cfg(unix)]
fn send_term(child: &Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: pid names a child we have not reaped yet, so it cannot have
    // been reused by another process.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_term(_child: &Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use keyvibe_audio::SoundPack;
    use keyvibe_common::RuntimeFlag;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixture {
        temp: tempfile::TempDir,
        channel: RuntimeStateChannel,
        packs_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let channel = RuntimeStateChannel::new(temp.path().join("run"), 1000);
        fs::create_dir_all(channel.dir()).unwrap();
        let packs_dir = temp.path().join("packs");
        Fixture {
            temp,
            channel,
            packs_dir,
        }
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn pack(dir: &Path, name: &str) -> PathBuf {
        let pack_dir = dir.join(name);
        fs::create_dir_all(&pack_dir).unwrap();
        let descriptor = pack_dir.join("config.json");
        fs::write(
            &descriptor,
            serde_json::json!({"sound": "all.wav", "defines": {"30": [0, 50]}}).to_string(),
        )
        .unwrap();
        descriptor
    }

    fn packs(fx: &Fixture) -> PackSet {
        PackSet::new(
            SoundPack::load(&pack(&fx.packs_dir, "kb")).unwrap(),
            SoundPack::load(&pack(&fx.packs_dir, "mouse")).unwrap(),
        )
    }

    fn selection() -> PackSelection {
        PackSelection {
            keyboard_pack: "kb".to_string(),
            mouse_pack: "mouse".to_string(),
            keyboard_volume: 70,
            mouse_volume: 30,
        }
    }

    fn wait_for_file(path: &Path) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(text) = fs::read_to_string(path) {
                if !text.is_empty() {
                    return text;
                }
            }
            assert!(Instant::now() < deadline, "{} never appeared", path.display());
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_launch_reflects_selection_and_flags() {
        let fx = fixture();
        fx.channel.write_bool(RuntimeFlag::MouseEnabled, false).unwrap();
        let supervisor = ChildSupervisor::new(
            ChildBinaries {
                input: PathBuf::from("/nonexistent/input"),
                audio: PathBuf::from("/nonexistent/audio"),
            },
            fx.channel.clone(),
            RuntimeFlags {
                global_mute: true,
                ..RuntimeFlags::default()
            },
            true,
        );

        let launch = supervisor.launch_for(&selection(), &packs(&fx)).unwrap();

        assert_eq!(launch.workdir, fx.packs_dir.join("kb"));
        assert_eq!(launch.args.keyboard_config, fx.packs_dir.join("kb/config.json"));
        assert_eq!(
            launch.args.mouse_config(),
            Some(fx.packs_dir.join("mouse/config.json").as_path())
        );
        assert_eq!(launch.args.keyboard_volume, 70);
        assert_eq!(launch.args.mouse_volume, 30);
        assert!(launch.args.verbose());
        assert_eq!(launch.args.mute, 1);
        assert_eq!(launch.args.mouse_enabled, 0);
        assert_eq!(launch.args.keyboard_enabled, 1);
    }

    #[test]
    fn test_children_are_piped_together() {
        let fx = fixture();
        let bin = fx.temp.path().join("bin");
        let binaries = ChildBinaries {
            input: script(
                &bin,
                "input",
                r#"echo '{"key_code": 30, "state_code": 1}'; exec sleep 30"#,
            ),
            audio: script(
                &bin,
                "audio",
                r#"printf '%s\n' "$@" > args.txt; exec cat > feed.txt"#,
            ),
        };
        let mut supervisor =
            ChildSupervisor::new(binaries, fx.channel.clone(), RuntimeFlags::default(), false);

        supervisor.apply(&selection(), packs(&fx)).unwrap();
        assert!(supervisor.is_running());

        let workdir = fx.packs_dir.join("kb");
        let feed = wait_for_file(&workdir.join("feed.txt"));
        assert!(feed.contains(r#""key_code": 30"#));

        let args = wait_for_file(&workdir.join("args.txt"));
        let expected = supervisor.last_launch().unwrap().args.to_args();
        assert_eq!(args.lines().collect::<Vec<_>>(), expected);

        supervisor.stop();
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.poll_exit(), None);
    }

    #[test]
    fn test_one_child_exiting_stops_the_other() {
        let fx = fixture();
        let bin = fx.temp.path().join("bin");
        let binaries = ChildBinaries {
            input: script(&bin, "input", "exec sleep 30"),
            audio: script(&bin, "audio", "exit 3"),
        };
        let mut supervisor =
            ChildSupervisor::new(binaries, fx.channel.clone(), RuntimeFlags::default(), false);
        supervisor.apply(&selection(), packs(&fx)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let exited = loop {
            if let Some(exited) = supervisor.poll_exit() {
                break exited;
            }
            assert!(Instant::now() < deadline, "audio child never exited");
            std::thread::sleep(Duration::from_millis(20));
        };

        assert_eq!(exited.0, ChildRole::Audio);
        assert_eq!(exited.1.code(), Some(3));
        assert!(!supervisor.is_running());
    }

    #[test]
    fn test_failed_restart_keeps_previous_launch() {
        let fx = fixture();
        let bin = fx.temp.path().join("bin");
        let binaries = ChildBinaries {
            input: script(&bin, "input", "exec sleep 30"),
            audio: script(&bin, "audio", "exec sleep 30"),
        };
        let mut supervisor =
            ChildSupervisor::new(binaries, fx.channel.clone(), RuntimeFlags::default(), false);
        supervisor.apply(&selection(), packs(&fx)).unwrap();
        let first = supervisor.last_launch().cloned().unwrap();

        let broken = Launch {
            workdir: fx.temp.path().join("no-such-dir"),
            ..first.clone()
        };
        assert!(supervisor.restart(broken).is_err());

        assert!(supervisor.is_running());
        assert_eq!(supervisor.last_launch(), Some(&first));
        supervisor.stop();
    }

    fn coordinator(fx: &Fixture, binaries: ChildBinaries) -> ReloadCoordinator<ChildSupervisor> {
        let mut supervisor =
            ChildSupervisor::new(binaries, fx.channel.clone(), RuntimeFlags::default(), false);
        supervisor.apply(&selection(), packs(fx)).unwrap();
        ReloadCoordinator::new(
            fx.temp.path().join(".keyvibe.json"),
            keyvibe_common::config::SoundPackLocator::new(None, fx.packs_dir.clone()),
            selection(),
            supervisor,
        )
    }

    #[test]
    fn test_supervise_reports_child_exit() {
        let fx = fixture();
        let bin = fx.temp.path().join("bin");
        let coordinator = coordinator(
            &fx,
            ChildBinaries {
                input: script(&bin, "input", "exec sleep 30"),
                audio: script(&bin, "audio", "exit 3"),
            },
        );
        let (_stop_tx, stop_rx) = mpsc::channel();

        let exit = supervise(coordinator, stop_rx, Duration::from_millis(10));
        let SupervisorExit::ChildExited(role, status) = exit else {
            panic!("unexpected {:?}", exit);
        };
        assert_eq!(role, ChildRole::Audio);
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn test_supervise_stops_on_request() {
        let fx = fixture();
        let bin = fx.temp.path().join("bin");
        let coordinator = coordinator(
            &fx,
            ChildBinaries {
                input: script(&bin, "input", "exec sleep 30"),
                audio: script(&bin, "audio", "exec sleep 30"),
            },
        );
        let (stop_tx, stop_rx) = mpsc::channel();
        stop_tx.send(()).unwrap();

        let started = Instant::now();
        assert_eq!(
            supervise(coordinator, stop_rx, Duration::from_secs(60)),
            SupervisorExit::Shutdown
        );
        assert!(started.elapsed() < STOP_GRACE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_slow_stop_does_not_stall_runtime() {
        let fx = fixture();
        let bin = fx.temp.path().join("bin");
        // Ignores SIGTERM, so stopping it takes the whole grace period
        let coordinator = coordinator(
            &fx,
            ChildBinaries {
                input: script(&bin, "input", "exec sleep 30"),
                audio: script(&bin, "audio", "trap '' TERM; while :; do sleep 0.05; done"),
            },
        );

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let started = Instant::now();
        let exit = tokio::spawn(supervise_until(
            coordinator,
            tokio::time::sleep(Duration::from_millis(200)),
        ))
        .await
        .unwrap()
        .unwrap();
        ticker.abort();

        assert_eq!(exit, SupervisorExit::Shutdown);
        assert!(started.elapsed() >= STOP_GRACE);
        // The ticker kept running on the single worker during the grace period
        assert!(ticks.load(Ordering::SeqCst) > 50);
    }

    #[test]
    fn test_missing_binary_is_an_error() {
        let fx = fixture();
        let mut supervisor = ChildSupervisor::new(
            ChildBinaries {
                input: fx.temp.path().join("missing-input"),
                audio: fx.temp.path().join("missing-audio"),
            },
            fx.channel.clone(),
            RuntimeFlags::default(),
            false,
        );

        assert!(supervisor.apply(&selection(), packs(&fx)).is_err());
        assert!(!supervisor.is_running());
    }
}
