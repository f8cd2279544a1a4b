//! External player process supervision and the keyboard-driven remote-control
//! vocabulary built on synthetic input.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::x11_embed::Window;

/// Delay between starting the player and the first window search, giving the
/// player time to map its window.
pub const STARTUP_SEARCH_DELAY: Duration = Duration::from_millis(200);

const STOP_REAP_TIMEOUT: Duration = Duration::from_secs(3);
const STOP_REAP_POLL: Duration = Duration::from_millis(50);

const SEEK_DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

/// Title passed to the player via `-window_title` so the locator's exact
/// match succeeds on the first attempt.
pub fn ffplay_window_title(media: &Path) -> String {
    let base = media
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("ffplay_{base}")
}

/// Digit keystroke for the player's decile-based seek: one digit per 10%,
/// anything past 90% clamps to the 90% digit.
pub fn seek_decile_key(percent: u32) -> &'static str {
    SEEK_DIGITS[((percent / 10) as usize).min(9)]
}

/// Volume changes are one keystroke per unit: `0` steps up, `9` steps down.
pub fn volume_keys(current: i32, target: i32) -> (&'static str, u32) {
    if target >= current {
        ("0", (target - current) as u32)
    } else {
        ("9", (current - target) as u32)
    }
}

/// Runs `<binary> -version` once to find out whether the player exists.
pub fn player_available(binary: &str) -> bool {
    match Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(err) => {
            debug!("{binary} not available: {err}");
            false
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Asks ffprobe for the media duration in seconds. Any failure leaves the
/// progress display indeterminate rather than blocking playback.
pub fn probe_duration_secs(probe_binary: &str, media: &Path) -> Option<f64> {
    let output = Command::new(probe_binary)
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(media)
        .stdin(Stdio::null())
        .output();
    match output {
        Ok(output) if output.status.success() => parse_probe_duration(&output.stdout),
        Ok(output) => {
            debug!("{probe_binary} exited with {}", output.status);
            None
        }
        Err(err) => {
            debug!("running {probe_binary} failed: {err}");
            None
        }
    }
}

fn parse_probe_duration(json: &[u8]) -> Option<f64> {
    let parsed: ProbeOutput = serde_json::from_slice(json).ok()?;
    let duration = parsed.format?.duration?;
    let secs: f64 = duration.trim().parse().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

/// Handle to a running external player. The process is the only thing owned
/// here; its window still belongs to it and the window manager.
pub struct PlayerProcess {
    child: Child,
}

impl PlayerProcess {
    /// Starts the player against `media` with the requested window title,
    /// border suppression and optional geometry hints.
    pub fn spawn(
        binary: &str,
        media: &Path,
        window_title: &str,
        geometry: Option<(u32, u32)>,
        volume: u8,
        extra_args: &[String],
    ) -> Result<Self> {
        if !media.exists() {
            bail!("input file does not exist: {}", media.display());
        }
        let mut command = Command::new(binary);
        command
            .arg("-autoexit")
            .args(["-volume", &volume.to_string()])
            .args(["-window_title", window_title])
            .arg("-noborder");
        if let Some((width, height)) = geometry {
            command
                .args(["-x", &width.to_string()])
                .args(["-y", &height.to_string()]);
        }
        command.args(extra_args);
        command.arg(media);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        debug!("starting player: {command:?}");
        let child = command
            .spawn()
            .with_context(|| format!("failed to start {binary}"))?;
        info!("player started (pid {})", child.id());
        Ok(Self { child })
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kills the player and reaps it with a bounded wait so stopping never
    /// freezes the UI for more than a short, visible moment.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(err) = self.child.kill() {
            warn!("failed to kill player (pid {}): {err}", self.child.id());
        }
        let deadline = Instant::now() + STOP_REAP_TIMEOUT;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("player exited: {status}");
                    return;
                }
                Ok(None) => std::thread::sleep(STOP_REAP_POLL),
                Err(err) => {
                    warn!("waiting for player exit failed: {err}");
                    return;
                }
            }
        }
        warn!(
            "player (pid {}) did not exit within {STOP_REAP_TIMEOUT:?} after kill",
            self.child.id()
        );
    }
}

/// Where a playback session stands with respect to embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Still looking for the player's window, with a bounded attempt budget.
    Searching { attempt: u32, next_try: Instant },
    /// The window was reparented into our container.
    Embedded { window: Window },
    /// The budget ran out or embedding failed; playback continues in the
    /// player's own window.
    Unembedded,
}

/// One playback-to-stop lifecycle: the player process, the located window,
/// and the bounded retry state. Exactly one session exists at a time.
pub struct PlayerSession {
    pub process: PlayerProcess,
    pub phase: SessionPhase,
    title_hint: String,
    file_name: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl PlayerSession {
    pub fn new(
        process: PlayerProcess,
        media: &Path,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            process,
            phase: SessionPhase::Searching {
                attempt: 0,
                next_try: Instant::now() + STARTUP_SEARCH_DELAY,
            },
            title_hint: ffplay_window_title(media),
            file_name: media
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Title hints for the locator, most specific first.
    pub fn hints(&self) -> [&str; 3] {
        [&self.title_hint, &self.file_name, "ffplay"]
    }

    pub fn embedded_window(&self) -> Option<Window> {
        match self.phase {
            SessionPhase::Embedded { window } => Some(window),
            _ => None,
        }
    }

    /// Records a failed search attempt; after the budget is spent the session
    /// settles in `Unembedded` and the search stops for good.
    pub fn register_failed_attempt(&mut self, now: Instant) {
        if let SessionPhase::Searching { attempt, .. } = self.phase {
            let spent = attempt + 1;
            if spent >= self.max_attempts {
                warn!(
                    "gave up locating the player window after {} attempts; \
                     playback continues unembedded",
                    self.max_attempts
                );
                self.phase = SessionPhase::Unembedded;
            } else {
                self.phase = SessionPhase::Searching {
                    attempt: spent,
                    next_try: now + self.retry_delay,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn window_title_uses_the_media_basename() {
        assert_eq!(
            ffplay_window_title(Path::new("/media/clips/movie.mp4")),
            "ffplay_movie"
        );
        assert_eq!(ffplay_window_title(Path::new("song.flac")), "ffplay_song");
    }

    #[test]
    fn seek_digit_clamps_to_the_ninetieth_decile() {
        assert_eq!(seek_decile_key(0), "0");
        assert_eq!(seek_decile_key(42), "4");
        assert_eq!(seek_decile_key(90), "9");
        assert_eq!(seek_decile_key(95), "9");
        assert_eq!(seek_decile_key(100), "9");
    }

    #[test]
    fn volume_keys_step_once_per_unit() {
        assert_eq!(volume_keys(50, 53), ("0", 3));
        assert_eq!(volume_keys(50, 44), ("9", 6));
        assert_eq!(volume_keys(70, 70), ("0", 0));
    }

    #[test]
    fn probe_duration_parses_ffprobe_json() {
        let json = br#"{"format": {"filename": "movie.mp4", "duration": "932.640000"}}"#;
        assert_eq!(parse_probe_duration(json), Some(932.64));
    }

    #[test]
    fn probe_duration_rejects_missing_or_bad_values() {
        assert_eq!(parse_probe_duration(b"{}"), None);
        assert_eq!(parse_probe_duration(br#"{"format": {}}"#), None);
        assert_eq!(
            parse_probe_duration(br#"{"format": {"duration": "n/a"}}"#),
            None
        );
        assert_eq!(
            parse_probe_duration(br#"{"format": {"duration": "0.0"}}"#),
            None
        );
        assert_eq!(parse_probe_duration(b"not json"), None);
    }

    fn searching_session(max_attempts: u32) -> PlayerSession {
        // A session shell for exercising the retry state machine; the child
        // process is a short-lived true(1) stand-in.
        let process = PlayerProcess {
            child: std::process::Command::new("true")
                .spawn()
                .expect("spawn stand-in process"),
        };
        PlayerSession::new(
            process,
            &PathBuf::from("movie.mp4"),
            max_attempts,
            Duration::from_millis(250),
        )
    }

    #[test]
    fn retry_budget_settles_in_unembedded_after_max_attempts() {
        let max_attempts = 20;
        let mut session = searching_session(max_attempts);
        let now = Instant::now();

        for _ in 0..max_attempts - 1 {
            session.register_failed_attempt(now);
            assert!(matches!(session.phase, SessionPhase::Searching { .. }));
        }
        session.register_failed_attempt(now);
        assert_eq!(session.phase, SessionPhase::Unembedded);

        // Further misses must not restart the search.
        session.register_failed_attempt(now);
        assert_eq!(session.phase, SessionPhase::Unembedded);
        session.process.stop();
    }

    #[test]
    fn failed_attempts_reschedule_with_the_configured_delay() {
        let mut session = searching_session(20);
        let now = Instant::now();
        session.register_failed_attempt(now);
        match session.phase {
            SessionPhase::Searching { attempt, next_try } => {
                assert_eq!(attempt, 1);
                assert_eq!(next_try, now + Duration::from_millis(250));
            }
            other => panic!("unexpected phase {other:?}"),
        }
        session.process.stop();
    }
}
