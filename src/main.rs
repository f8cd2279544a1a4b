mod config;
mod player;
mod x11_embed;

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use eframe::egui::{self, Align2, Color32, ViewportBuilder};
use log::{debug, info, warn};
use raw_window_handle::{HasWindowHandle, RawWindowHandle};

use crate::config::{Config, ConfigWatcher};
use crate::player::{PlayerProcess, PlayerSession, SessionPhase};
use crate::x11_embed::{MouseButton, RecoveredEvent, Window, X11EmbedHelper, MONITOR_TICK};

/// Clicks this close to the end of the bar snap to 100%.
const SEEK_SNAP_THRESHOLD: f64 = 0.995;

/// Geometry hints below this size are noise from a not-yet-laid-out window.
const GEOMETRY_HINT_MIN: u32 = 100;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PlayState {
    Stopped,
    Playing,
    Paused,
}

fn state_label(state: PlayState) -> &'static str {
    match state {
        PlayState::Stopped => "Stopped",
        PlayState::Playing => "Playing",
        PlayState::Paused => "Paused",
    }
}

fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0).floor() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

fn snap_fraction(fraction: f64) -> f64 {
    let fraction = fraction.clamp(0.0, 1.0);
    if fraction > SEEK_SNAP_THRESHOLD {
        1.0
    } else {
        fraction
    }
}

struct App {
    config: Config,
    config_watcher: Option<ConfigWatcher>,
    x11: X11EmbedHelper,
    session: Option<PlayerSession>,
    media_path: String,
    state: PlayState,
    volume: i32,
    duration_secs: f64,
    position_secs: f64,
    last_position_update: Instant,
    last_monitor_tick: Instant,
    player_available: bool,
    status: Option<String>,
    app_window: Option<Window>,
    app_window_resolved: bool,
    container: Option<Window>,
    container_mapped: bool,
    /// Geometry last applied to the container, in physical pixels.
    container_geometry: Option<(i32, i32, u32, u32)>,
    /// Video area computed by the most recent layout pass, in physical pixels.
    video_area: Option<(i32, i32, u32, u32)>,
}

impl Default for App {
    fn default() -> Self {
        let config = Config::load().unwrap_or_else(|err| {
            warn!("loading configuration failed: {err:#}");
            Config::default()
        });
        let config_watcher = ConfigWatcher::new();

        let mut x11 = X11EmbedHelper::new();
        x11.initialize();

        let player_available = player::player_available(&config.player.binary);
        if !player_available {
            warn!("{} is not available on this system", config.player.binary);
        }

        let media_path = env::args().nth(1).unwrap_or_default();
        let volume = config.player.default_volume();

        Self {
            config,
            config_watcher,
            x11,
            session: None,
            media_path,
            state: PlayState::Stopped,
            volume,
            duration_secs: 0.0,
            position_secs: 0.0,
            last_position_update: Instant::now(),
            last_monitor_tick: Instant::now(),
            player_available,
            status: None,
            app_window: None,
            app_window_resolved: false,
            container: None,
            container_mapped: false,
            container_geometry: None,
            video_area: None,
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.maintain_config_watcher();
        self.resolve_app_window(frame);
        self.advance_position();

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.add_space(4.0);
            self.render_controls(ui);
            ui.add_space(4.0);
        });

        let mut video_rect = None;
        egui::CentralPanel::default()
            .frame(egui::Frame::default().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                video_rect = Some(rect);
                if let Some(message) = self.video_placeholder() {
                    ui.painter().text(
                        rect.center(),
                        Align2::CENTER_CENTER,
                        message,
                        egui::TextStyle::Body.resolve(ui.style()),
                        Color32::GRAY,
                    );
                }
            });

        if let Some(rect) = video_rect {
            self.sync_container(ctx, rect);
        }
        self.drive_session();

        ctx.request_repaint_after(self.desired_repaint_interval());
    }
}

impl App {
    fn desired_repaint_interval(&self) -> Duration {
        // Tick at the monitor cadence while embedded; back off elsewhere.
        match self.session.as_ref().map(|session| session.phase) {
            Some(SessionPhase::Embedded { .. }) => MONITOR_TICK,
            Some(SessionPhase::Searching { .. }) => Duration::from_millis(100),
            Some(SessionPhase::Unembedded) | None => {
                if self.state == PlayState::Playing {
                    Duration::from_millis(250)
                } else {
                    Duration::from_millis(500)
                }
            }
        }
    }

    fn maintain_config_watcher(&mut self) {
        let Some(watcher) = self.config_watcher.as_ref() else {
            return;
        };
        if !watcher.poll_changed() {
            return;
        }
        match Config::load() {
            Ok(config) => {
                info!("configuration reloaded");
                self.config = config;
            }
            Err(err) => {
                warn!("reloading configuration failed: {err:#}");
                self.status = Some(format!("Config reload failed: {err:#}"));
            }
        }
    }

    fn resolve_app_window(&mut self, frame: &eframe::Frame) {
        if self.app_window_resolved || !self.x11.is_initialized() {
            return;
        }
        self.app_window_resolved = true;
        let Ok(handle) = frame.window_handle() else {
            warn!("no native window handle available");
            return;
        };
        self.app_window = match handle.as_raw() {
            RawWindowHandle::Xlib(xlib) => Some(xlib.window as Window),
            RawWindowHandle::Xcb(xcb) => Some(xcb.window.get()),
            other => {
                warn!("unsupported native window handle {other:?}; embedding disabled");
                None
            }
        };
        if let Some(window) = self.app_window {
            debug!("host toplevel window 0x{window:x}");
        }
    }

    fn advance_position(&mut self) {
        let now = Instant::now();
        if self.state == PlayState::Playing && self.duration_secs > 0.0 {
            let elapsed = now.duration_since(self.last_position_update).as_secs_f64();
            self.position_secs = (self.position_secs + elapsed).min(self.duration_secs);
        }
        self.last_position_update = now;
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|row| {
            row.label("Media:");
            let width = (row.available_width() - 8.0).max(120.0);
            row.add(
                egui::TextEdit::singleline(&mut self.media_path)
                    .hint_text("Path to a media file")
                    .desired_width(width),
            );
        });

        ui.horizontal(|row| {
            let play_label = if self.state == PlayState::Playing {
                "Pause"
            } else {
                "Play"
            };
            if row.button(play_label).clicked() {
                self.toggle_play_pause();
            }
            if row.button("Stop").clicked() {
                self.stop_playback();
            }
            row.separator();
            let mut volume = self.volume;
            if row
                .add(egui::Slider::new(&mut volume, 0..=100).text("Volume"))
                .changed()
            {
                self.apply_volume(volume);
            }
            row.separator();
            row.label(state_label(self.state));
        });

        self.render_progress_bar(ui);

        if !self.player_available {
            ui.colored_label(
                ui.visuals().warn_fg_color,
                format!(
                    "{} was not found; install FFmpeg to play media.",
                    self.config.player.binary
                ),
            );
        }
        if let Some(status) = self.status.clone() {
            ui.colored_label(ui.visuals().warn_fg_color, status);
        }
    }

    fn render_progress_bar(&mut self, ui: &mut egui::Ui) {
        let desired = egui::vec2(ui.available_width(), 18.0);
        let (rect, response) = ui.allocate_exact_size(desired, egui::Sense::click());

        let fraction = if self.duration_secs > 0.0 {
            (self.position_secs / self.duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let painter = ui.painter_at(rect);
        let rounding = egui::CornerRadius::same(4);
        painter.rect_filled(rect, rounding, ui.visuals().extreme_bg_color);
        if fraction > 0.0 {
            let mut fill = rect;
            fill.set_width(rect.width() * fraction as f32);
            painter.rect_filled(fill, rounding, ui.visuals().selection.bg_fill);
        }

        let label = if self.duration_secs > 0.0 {
            format!(
                "{} / {}",
                format_timestamp(self.position_secs),
                format_timestamp(self.duration_secs)
            )
        } else {
            format_timestamp(self.position_secs)
        };
        painter.text(
            rect.center(),
            Align2::CENTER_CENTER,
            label,
            egui::TextStyle::Small.resolve(ui.style()),
            ui.visuals().strong_text_color(),
        );

        if response.hovered() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }
        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let fraction = f64::from((pos.x - rect.left()) / rect.width().max(1.0));
                self.seek_via_click(snap_fraction(fraction));
            }
        }
    }

    fn video_placeholder(&self) -> Option<&'static str> {
        match self.session.as_ref().map(|session| session.phase) {
            None => Some("No media playing"),
            Some(SessionPhase::Searching { .. }) => Some("Waiting for the player window…"),
            Some(SessionPhase::Unembedded) => Some("Playing in the player's own window"),
            Some(SessionPhase::Embedded { .. }) => None,
        }
    }

    /// Keeps the native container window glued to the egui video area and the
    /// embedded window sized to the container.
    fn sync_container(&mut self, ctx: &egui::Context, video_rect: egui::Rect) {
        if !self.x11.is_initialized() {
            return;
        }
        let Some(app_window) = self.app_window else {
            return;
        };

        let scale = ctx.pixels_per_point();
        let x = (video_rect.left() * scale).round() as i32;
        let y = (video_rect.top() * scale).round() as i32;
        let width = (video_rect.width() * scale).round().max(1.0) as u32;
        let height = (video_rect.height() * scale).round().max(1.0) as u32;
        let target = (x, y, width, height);
        self.video_area = Some(target);

        match self.container {
            None => {
                if self.session.is_some() {
                    self.container = self.x11.create_container(app_window, x, y, width, height);
                    if self.container.is_some() {
                        self.container_mapped = true;
                        self.container_geometry = Some(target);
                    }
                }
            }
            Some(container) => {
                if self.container_geometry != Some(target)
                    && self.x11.move_container(container, x, y, width, height)
                {
                    self.container_geometry = Some(target);
                    if let Some(window) = self
                        .session
                        .as_ref()
                        .and_then(|session| session.embedded_window())
                    {
                        self.x11.resize_window(window, width, height);
                    }
                }
            }
        }
    }

    fn drive_session(&mut self) {
        let running = match self.session.as_mut() {
            Some(session) => session.process.is_running(),
            None => return,
        };
        if !running {
            self.finish_session();
            return;
        }

        let now = Instant::now();
        match self.session.as_ref().map(|session| session.phase) {
            Some(SessionPhase::Searching { next_try, .. }) if now >= next_try => {
                self.attempt_embedding(now);
            }
            Some(SessionPhase::Embedded { .. }) => self.monitor_tick(now),
            _ => {}
        }
    }

    fn attempt_embedding(&mut self, now: Instant) {
        let hints: Vec<String> = self
            .session
            .as_ref()
            .map(|session| session.hints().map(String::from).to_vec())
            .unwrap_or_default();

        let mut found = None;
        for hint in &hints {
            if let Some(window) = self.x11.find_window(hint) {
                found = Some(window);
                break;
            }
        }

        match (found, self.container) {
            (Some(window), Some(container)) => {
                if self.x11.embed_window(window, container) {
                    if let Some((_, _, width, height)) = self.container_geometry {
                        self.x11.resize_window(window, width, height);
                    }
                    self.x11.show_window(window);
                    self.x11.start_event_monitoring(window);
                    if let Some(session) = self.session.as_mut() {
                        session.phase = SessionPhase::Embedded { window };
                    }
                    info!("player window embedded; monitoring input");
                } else {
                    // The reparent sequence may have partially applied;
                    // abandon the session rather than retry the same handle.
                    self.status =
                        Some("Embedding the player window failed; playback stopped.".to_string());
                    self.stop_playback();
                }
            }
            _ => {
                let mut exhausted = false;
                if let Some(session) = self.session.as_mut() {
                    session.register_failed_attempt(now);
                    exhausted = session.phase == SessionPhase::Unembedded;
                }
                if exhausted {
                    self.status = Some(
                        "Could not locate the player window; playback continues in its own window."
                            .to_string(),
                    );
                    self.hide_container();
                }
            }
        }
    }

    fn monitor_tick(&mut self, now: Instant) {
        if now.duration_since(self.last_monitor_tick) < MONITOR_TICK {
            return;
        }
        self.last_monitor_tick = now;
        for event in self.x11.poll_recovered_events() {
            self.handle_recovered(event);
        }
    }

    fn handle_recovered(&mut self, event: RecoveredEvent) {
        match event {
            RecoveredEvent::PointerPress {
                root_x,
                root_y,
                window_width,
                window_height,
                window,
            } => {
                let Some((local_x, local_y)) = self.x11.window_local(window, root_x, root_y)
                else {
                    return;
                };
                if window_width == 0
                    || local_x < 0
                    || local_y < 0
                    || local_x >= i32::from(window_width)
                    || local_y >= i32::from(window_height)
                {
                    return;
                }
                let fraction = snap_fraction(f64::from(local_x) / f64::from(window_width));
                self.position_secs = fraction * self.duration_secs;
                self.last_position_update = Instant::now();
                if self.state == PlayState::Playing {
                    let percent = (fraction * 100.0).round() as u32;
                    self.x11.send_key(window, "s");
                    self.x11.send_key(window, player::seek_decile_key(percent));
                    debug!("seeking to {percent}% after recovered right-click");
                }
            }
            RecoveredEvent::KeyPress { .. } => {
                let Some(window) = self
                    .session
                    .as_ref()
                    .and_then(|session| session.embedded_window())
                else {
                    return;
                };
                debug!("recovered space press; toggling pause state");
                // ffplay handled the physical space itself; two pairs leave
                // its pause state as-is while the UI catches up.
                self.x11.send_key(window, "p");
                self.x11.send_key(window, "p");
                match self.state {
                    PlayState::Playing => self.state = PlayState::Paused,
                    _ => {
                        self.state = PlayState::Playing;
                        self.last_position_update = Instant::now();
                    }
                }
            }
        }
    }

    fn toggle_play_pause(&mut self) {
        match self.state {
            PlayState::Playing => self.pause(),
            _ => self.play(),
        }
    }

    fn play(&mut self) {
        if self.session.is_some() {
            if self.state == PlayState::Paused {
                if let Some(window) = self
                    .session
                    .as_ref()
                    .and_then(|session| session.embedded_window())
                {
                    self.x11.send_key(window, "p");
                }
                self.state = PlayState::Playing;
                self.last_position_update = Instant::now();
            }
            return;
        }
        self.start_playback();
    }

    fn pause(&mut self) {
        if self.state != PlayState::Playing {
            return;
        }
        let Some(window) = self
            .session
            .as_ref()
            .and_then(|session| session.embedded_window())
        else {
            return;
        };
        self.x11.send_key(window, "p");
        self.state = PlayState::Paused;
    }

    fn start_playback(&mut self) {
        let media = self.media_path.trim();
        if media.is_empty() {
            self.status = Some("No media file set.".to_string());
            return;
        }
        let media = PathBuf::from(media);

        // One session at a time; a new start tears the old one down.
        self.stop_playback();

        if !self.x11.initialize() {
            self.status = Some(
                "X11 unavailable; playback will run in the player's own window.".to_string(),
            );
        }

        self.duration_secs =
            player::probe_duration_secs(&self.config.player.probe_binary, &media).unwrap_or(0.0);
        self.position_secs = 0.0;

        let title = player::ffplay_window_title(&media);
        let geometry = self.video_area.and_then(|(_, _, width, height)| {
            (width > GEOMETRY_HINT_MIN && height > GEOMETRY_HINT_MIN).then_some((width, height))
        });

        match PlayerProcess::spawn(
            &self.config.player.binary,
            &media,
            &title,
            geometry,
            self.volume.clamp(0, 100) as u8,
            &self.config.player.extra_args,
        ) {
            Ok(process) => {
                self.session = Some(PlayerSession::new(
                    process,
                    &media,
                    self.config.embed.max_find_attempts(),
                    self.config.embed.find_retry_delay(),
                ));
                self.state = PlayState::Playing;
                self.status = None;
                self.last_position_update = Instant::now();
                if let Some(container) = self.container {
                    if self.x11.set_window_mapped(container, true) {
                        self.container_mapped = true;
                    }
                }
            }
            Err(err) => {
                warn!("starting playback failed: {err:#}");
                self.status = Some(format!("Failed to start playback: {err:#}"));
            }
        }
    }

    /// Full cancellation: stop monitoring, kill the player, clear all session
    /// state. Safe from any phase, including mid-search.
    fn stop_playback(&mut self) {
        self.x11.stop_event_monitoring();
        if let Some(mut session) = self.session.take() {
            session.process.stop();
        }
        self.state = PlayState::Stopped;
        self.position_secs = 0.0;
        self.hide_container();
    }

    fn finish_session(&mut self) {
        info!("player process exited");
        self.x11.stop_event_monitoring();
        self.session = None;
        self.state = PlayState::Stopped;
        self.position_secs = 0.0;
        self.hide_container();
    }

    fn hide_container(&mut self) {
        if self.container_mapped {
            if let Some(container) = self.container {
                self.x11.set_window_mapped(container, false);
            }
            self.container_mapped = false;
        }
    }

    fn apply_volume(&mut self, target: i32) {
        let target = target.clamp(0, 100);
        if let Some(window) = self
            .session
            .as_ref()
            .and_then(|session| session.embedded_window())
        {
            let (key, count) = player::volume_keys(self.volume, target);
            for _ in 0..count {
                self.x11.send_key(window, key);
            }
        }
        self.volume = target;
    }

    fn seek_via_click(&mut self, fraction: f64) {
        self.position_secs = fraction * self.duration_secs;
        self.last_position_update = Instant::now();
        if self.state == PlayState::Stopped {
            return;
        }
        let Some(window) = self
            .session
            .as_ref()
            .and_then(|session| session.embedded_window())
        else {
            return;
        };
        if let Some((_, _, width, height)) = self.container_geometry {
            // A right-click makes the player seek to that fraction of its
            // window width.
            let x = (fraction * f64::from(width)) as i16;
            let y = (height / 2) as i16;
            self.x11.send_mouse_click(window, x, y, MouseButton::Right);
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.stop_playback();
        self.x11.cleanup();
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default().with_inner_size([960.0, 640.0]),
        ..Default::default()
    };
    let run_res = eframe::run_native(
        "Embedded Player",
        native_options,
        Box::new(
            |_cc| -> std::result::Result<
                Box<dyn eframe::App>,
                Box<dyn std::error::Error + Send + Sync>,
            > { Ok(Box::new(App::default())) },
        ),
    );
    if let Err(e) = run_res {
        return Err(Box::new(e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_timestamp_handles_hours_and_negatives() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(59.9), "0:59");
        assert_eq!(format_timestamp(61.0), "1:01");
        assert_eq!(format_timestamp(3661.0), "1:01:01");
        assert_eq!(format_timestamp(-5.0), "0:00");
    }

    #[test]
    fn snap_fraction_clamps_and_snaps_near_the_end() {
        assert_eq!(snap_fraction(-0.3), 0.0);
        assert_eq!(snap_fraction(0.5), 0.5);
        assert_eq!(snap_fraction(0.996), 1.0);
        assert_eq!(snap_fraction(2.0), 1.0);
    }
}
