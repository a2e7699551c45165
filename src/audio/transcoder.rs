//! ffmpeg-backed stream transcoding.
//!
//! Every track gets its own `ffmpeg` process reading the resolved URL and
//! writing raw PCM (s16le, 48 kHz, stereo) to stdout. Processes are tracked
//! in a [`ProcessRegistry`] so shutdown can kill whatever is still running.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PlaybackError;

/// Tiempo entre SIGTERM y SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(1);
const EXIT_POLL: Duration = Duration::from_millis(250);

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;

/// Raw s16le PCM, 48 kHz stereo.
pub type PcmStream = Box<dyn Read + Send + Sync>;

/// Releases a track's resources exactly once, on [`release`](Self::release)
/// or on drop, whichever comes first.
pub struct CleanupHandle(Mutex<Option<Box<dyn FnOnce() + Send>>>);

impl CleanupHandle {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Mutex::new(Some(Box::new(release))))
    }

    pub fn release(&self) {
        let release = self.0.lock().take();
        if let Some(release) = release {
            release();
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CleanupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("pending", &self.0.lock().is_some())
            .finish()
    }
}

/// A live PCM stream and the handle that tears it down.
pub struct AudioHandle {
    pub stream: PcmStream,
    pub cleanup: CleanupHandle,
}

/// Every transcoder process still running, so shutdown can kill them.
#[derive(Default)]
pub struct ProcessRegistry {
    children: Mutex<HashMap<u64, Arc<Mutex<Child>>>>,
    next_id: AtomicU64,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, child: Arc<Mutex<Child>>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.children.lock().insert(id, child);
        id
    }

    /// Stops tracking a process. Releasing twice is a no-op.
    fn release(&self, id: u64) -> Option<Arc<Mutex<Child>>> {
        self.children.lock().remove(&id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force-kills every tracked process. Returns how many were tracked.
    pub fn kill_all(&self) -> usize {
        let children: Vec<_> = self.children.lock().drain().map(|(_, child)| child).collect();

        for child in &children {
            let mut child = child.lock();
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }

        if !children.is_empty() {
            info!("🧹 {} procesos de ffmpeg terminados", children.len());
        }
        children.len()
    }
}

pub struct Transcoder {
    ffmpeg_path: String,
    user_agent: String,
    registry: Arc<ProcessRegistry>,
}

impl Transcoder {
    pub fn new(ffmpeg_path: impl Into<String>, user_agent: impl Into<String>, registry: Arc<ProcessRegistry>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            user_agent: user_agent.into(),
            registry,
        }
    }

    /// Starts decoding `url`. Must be called inside a tokio runtime.
    pub fn spawn(&self, url: &str) -> Result<AudioHandle, PlaybackError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(ffmpeg_args(&self.user_agent, url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PlaybackError::Transcode(format!("no se pudo iniciar ffmpeg: {}", e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PlaybackError::Transcode("ffmpeg sin stdout".to_string()));
            }
        };

        if let Some(stderr) = child.stderr.take() {
            tokio::task::spawn_blocking(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    if !line.trim().is_empty() {
                        warn!(target: "ffmpeg", "{}", line.trim());
                    }
                }
            });
        }

        debug!("🎛️ ffmpeg iniciado (pid {})", child.id());

        let child = Arc::new(Mutex::new(child));
        let id = self.registry.register(child.clone());
        tokio::spawn(watch_exit(self.registry.clone(), id, child.clone()));

        let registry = self.registry.clone();
        Ok(AudioHandle {
            stream: Box::new(stdout),
            cleanup: CleanupHandle::new(move || terminate(&registry, id, child)),
        })
    }
}

pub fn ffmpeg_args(user_agent: &str, url: &str) -> Vec<String> {
    [
        "-reconnect",
        "1",
        "-reconnect_streamed",
        "1",
        "-reconnect_delay_max",
        "5",
        "-user_agent",
        user_agent,
        "-i",
        url,
        "-analyzeduration",
        "5000000",
        "-probesize",
        "5000000",
        "-loglevel",
        "error",
        "-f",
        "s16le",
        "-ar",
        "48000",
        "-ac",
        "2",
        "pipe:1",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

/// Logs the exit and drops the process from the registry. stdout is left
/// alone so buffered audio still plays out.
async fn watch_exit(registry: Arc<ProcessRegistry>, id: u64, child: Arc<Mutex<Child>>) {
    let mut ticker = tokio::time::interval(EXIT_POLL);
    loop {
        ticker.tick().await;

        let status = child.lock().try_wait();
        match status {
            Ok(Some(status)) => {
                if status.success() {
                    debug!("ffmpeg terminó correctamente");
                } else {
                    warn!("⚠️ ffmpeg terminó con {}", status);
                }
                registry.release(id);
                return;
            }
            Ok(None) => continue,
            Err(e) => {
                warn!("⚠️ No se pudo consultar ffmpeg: {}", e);
                registry.release(id);
                return;
            }
        }
    }
}

/// SIGTERM, then SIGKILL after [`KILL_GRACE`] if the process is still alive.
fn terminate(registry: &ProcessRegistry, id: u64, child: Arc<Mutex<Child>>) {
    registry.release(id);

    {
        let mut guard = child.lock();
        if !matches!(guard.try_wait(), Ok(None)) {
            return;
        }
        if !send_sigterm(&guard) {
            let _ = guard.kill();
            let _ = guard.wait();
            return;
        }
    }

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(KILL_GRACE).await;
                let mut guard = child.lock();
                if let Ok(None) = guard.try_wait() {
                    warn!("⚠️ ffmpeg no respondió a SIGTERM, forzando cierre");
                    let _ = guard.kill();
                    let _ = guard.wait();
                }
            });
        }
        Err(_) => {
            let mut guard = child.lock();
            let _ = guard.kill();
            let _ = guard.wait();
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cleanup_runs_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = CleanupHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.release();
        handle.release();
        drop(handle);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_an_unreleased_handle_cleans_up() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        drop(CleanupHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn args_request_resilient_pcm_output() {
        let args = ffmpeg_args("agent/1.0", "https://proxy/audio");
        let position = |flag: &str| args.iter().position(|a| a == flag).expect(flag);

        assert_eq!(args[position("-user_agent") + 1], "agent/1.0");
        assert_eq!(args[position("-i") + 1], "https://proxy/audio");
        assert_eq!(args[position("-f") + 1], "s16le");
        assert_eq!(args[position("-ar") + 1], "48000");
        assert_eq!(args[position("-ac") + 1], "2");
        assert_eq!(args[position("-reconnect") + 1], "1");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_transcode_error() {
        let transcoder = Transcoder::new("/nonexistent/ffmpeg", "agent", Arc::new(ProcessRegistry::new()));
        assert!(matches!(
            transcoder.spawn("https://proxy/audio"),
            Err(PlaybackError::Transcode(_))
        ));
    }

    #[cfg(unix)]
    fn sleeper(registry: &ProcessRegistry) -> (u64, Arc<Mutex<Child>>) {
        let child = Command::new("sleep").arg("30").spawn().expect("sleep");
        let child = Arc::new(Mutex::new(child));
        (registry.register(child.clone()), child)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_detaches_and_stops_the_process() {
        let registry = ProcessRegistry::new();
        let (id, child) = sleeper(&registry);
        assert_eq!(registry.len(), 1);

        terminate(&registry, id, child.clone());
        assert!(registry.is_empty());

        let mut exited = false;
        for _ in 0..40 {
            if let Ok(Some(_)) = child.lock().try_wait() {
                exited = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(exited);

        // ya terminó: no debe fallar
        terminate(&registry, id, child);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_exiting_on_its_own_leaves_the_registry() {
        let registry = Arc::new(ProcessRegistry::new());
        let child = Command::new("true").spawn().expect("true");
        let child = Arc::new(Mutex::new(child));
        let id = registry.register(child.clone());

        let watcher = tokio::spawn(watch_exit(registry.clone(), id, child.clone()));
        tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .expect("watch_exit should notice the exit")
            .expect("watcher task");
        assert!(registry.is_empty());

        // cleanup tardío: sin efecto
        terminate(&registry, id, child);
        assert!(registry.is_empty());
        assert_eq!(registry.kill_all(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn kill_all_empties_the_registry() {
        let registry = ProcessRegistry::new();
        let (_, first) = sleeper(&registry);
        let (_, second) = sleeper(&registry);

        assert_eq!(registry.kill_all(), 2);
        assert!(registry.is_empty());
        assert!(matches!(first.lock().try_wait(), Ok(Some(_))));
        assert!(matches!(second.lock().try_wait(), Ok(Some(_))));
        assert_eq!(registry.kill_all(), 0);
    }
}
