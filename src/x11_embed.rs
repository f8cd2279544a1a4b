//! X11 plumbing for splicing an external player window into our own window
//! tree and remote-controlling it with synthetic input.
//!
//! Everything here degrades instead of failing hard: window handles belong to
//! the external process and can go stale at any moment, so every operation
//! re-validates and reports `false`/`None` rather than propagating an error
//! to the UI.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ButtonPressEvent, ChangeWindowAttributesAux, ConfigureWindowAux,
    ConnectionExt, CreateWindowAux, EventMask, KeyButMask, KeyPressEvent, StackMode,
    WindowClass, BUTTON_PRESS_EVENT, BUTTON_RELEASE_EVENT, KEY_PRESS_EVENT, KEY_RELEASE_EVENT,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::{CURRENT_TIME, NONE};

pub use x11rb::protocol::xproto::Window;

/// Cadence of the monitoring tick driven by the host update loop.
pub const MONITOR_TICK: Duration = Duration::from_millis(50);

/// Keymap polling can observe one physical keystroke as "down" across several
/// consecutive ticks; presses inside this window are treated as the same one.
pub const KEY_REPEAT_HOLDOFF: Duration = Duration::from_millis(200);

const PLAYER_PROCESS_NAME: &str = "ffplay";

const MEDIA_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".m4v", ".webm",
];

const SPACE_KEYSYM: u32 = 0x0020;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    fn detail(self) -> u8 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Middle => 2,
            MouseButton::Right => 3,
        }
    }

    fn state_mask(self) -> KeyButMask {
        match self {
            MouseButton::Left => KeyButMask::BUTTON1,
            MouseButton::Middle => KeyButMask::BUTTON2,
            MouseButton::Right => KeyButMask::BUTTON3,
        }
    }
}

/// An input event recovered from the embedded window, either from the normal
/// event queue or from the polling fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveredEvent {
    PointerPress {
        root_x: i16,
        root_y: i16,
        window_width: u16,
        window_height: u16,
        window: Window,
    },
    KeyPress {
        keysym: u32,
        window: Window,
    },
}

fn title_matches(title: &str, hint: &str) -> bool {
    !hint.is_empty() && (title == hint || title.contains(hint))
}

/// Fallback match for when the requested window title was ignored: the title
/// still starts with the player's process name and names a media file.
fn is_player_window_title(title: &str) -> bool {
    let lowered = title.to_ascii_lowercase();
    lowered.starts_with(PLAYER_PROCESS_NAME)
        && MEDIA_EXTENSIONS.iter().any(|ext| lowered.contains(ext))
}

fn keysym_from_name(name: &str) -> Option<u32> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        // Latin-1 keysyms coincide with ASCII for printable characters.
        if c.is_ascii_graphic() {
            return Some(c as u32);
        }
    }
    match name {
        "space" => Some(0x0020),
        "Return" => Some(0xff0d),
        "Escape" => Some(0xff1b),
        "Left" => Some(0xff51),
        "Up" => Some(0xff52),
        "Right" => Some(0xff53),
        "Down" => Some(0xff54),
        _ => None,
    }
}

/// Rising-edge detector for a polled button state.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    down: bool,
}

impl EdgeDetector {
    pub fn rising(&mut self, down: bool) -> bool {
        let rising = down && !self.down;
        self.down = down;
        rising
    }
}

/// Rising-edge detector with a hold-off so a keystroke observed as "down"
/// across several polls is reported once.
#[derive(Debug)]
pub struct KeyDebounce {
    down: bool,
    last_accepted: Option<Instant>,
    hold_off: Duration,
}

impl KeyDebounce {
    pub fn new(hold_off: Duration) -> Self {
        Self {
            down: false,
            last_accepted: None,
            hold_off,
        }
    }

    pub fn observe(&mut self, down: bool, now: Instant) -> bool {
        let rising = down && !self.down;
        self.down = down;
        if !rising {
            return false;
        }
        if let Some(last) = self.last_accepted {
            if now.duration_since(last) < self.hold_off {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

struct DisplayState {
    conn: RustConnection,
    root: Window,
    black_pixel: u32,
    net_wm_name: Atom,
    utf8_string: Atom,
    /// keysym -> keycode for the current keyboard, built once per connection.
    keymap: HashMap<u32, u8>,
}

struct MonitorState {
    window: Window,
    active: bool,
    right_button: EdgeDetector,
    space: KeyDebounce,
    space_keycode: Option<u8>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            window: 0,
            active: false,
            right_button: EdgeDetector::default(),
            space: KeyDebounce::new(KEY_REPEAT_HOLDOFF),
            space_keycode: None,
        }
    }
}

/// Owns the process's one X11 connection and all state for the embedding
/// subsystem. Created idle; `initialize` opens the connection lazily.
#[derive(Default)]
pub struct X11EmbedHelper {
    display: Option<DisplayState>,
    monitor: MonitorState,
}

impl X11EmbedHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the display connection. Idempotent; returns false when no X11
    /// environment is reachable, in which case every other operation becomes
    /// a no-op that reports failure.
    pub fn initialize(&mut self) -> bool {
        if self.display.is_some() {
            return true;
        }
        match open_display() {
            Ok(display) => {
                info!("X11 display opened");
                self.display = Some(display);
                true
            }
            Err(err) => {
                warn!("X11 unavailable, window embedding disabled: {err:#}");
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.display.is_some()
    }

    /// Drops the connection. Safe to call when already closed.
    pub fn cleanup(&mut self) {
        self.stop_event_monitoring();
        if self.display.take().is_some() {
            debug!("X11 display connection closed");
        }
    }

    /// Depth-first walk of the window tree from the root; first window whose
    /// title matches the hint (or looks like a player window) wins.
    pub fn find_window(&self, hint: &str) -> Option<Window> {
        let display = self.display.as_ref()?;
        match find_window_recursive(display, display.root, hint) {
            Ok(found) => found,
            Err(err) => {
                warn!("window search failed: {err:#}");
                None
            }
        }
    }

    /// Reparents `child` into `parent` at the container origin, strips its
    /// border and maps it again. Returns false without side effects when the
    /// child no longer exists; a mid-sequence failure is not rolled back.
    pub fn embed_window(&self, child: Window, parent: Window) -> bool {
        let Some(display) = self.display.as_ref() else {
            return false;
        };
        if child == 0 || parent == 0 {
            return false;
        }
        match try_embed(display, child, parent) {
            Ok(embedded) => embedded,
            Err(err) => {
                warn!("embedding window 0x{child:x} failed: {err:#}");
                false
            }
        }
    }

    pub fn resize_window(&self, window: Window, width: u32, height: u32) -> bool {
        let Some(display) = self.display.as_ref() else {
            return false;
        };
        if window == 0 {
            return false;
        }
        let aux = ConfigureWindowAux::new().width(width).height(height);
        match display
            .conn
            .configure_window(window, &aux)
            .and_then(|_| display.conn.flush())
        {
            Ok(()) => true,
            Err(err) => {
                warn!("resizing window 0x{window:x} failed: {err}");
                false
            }
        }
    }

    /// Maps and raises the window.
    pub fn show_window(&self, window: Window) -> bool {
        let Some(display) = self.display.as_ref() else {
            return false;
        };
        if window == 0 {
            return false;
        }
        let raise = ConfigureWindowAux::new().stack_mode(StackMode::ABOVE);
        let result = display
            .conn
            .map_window(window)
            .and_then(|_| display.conn.configure_window(window, &raise))
            .and_then(|_| display.conn.flush());
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("showing window 0x{window:x} failed: {err}");
                false
            }
        }
    }

    /// Synthesizes a key press/release pair for a named key. Single
    /// keystrokes are always a full pair so the receiver's toggle logic sees
    /// a real tap.
    pub fn send_key(&self, window: Window, key: &str) -> bool {
        let Some(display) = self.display.as_ref() else {
            return false;
        };
        if window == 0 {
            return false;
        }
        match try_send_key(display, window, key) {
            Ok(sent) => sent,
            Err(err) => {
                warn!("sending key {key:?} to 0x{window:x} failed: {err:#}");
                false
            }
        }
    }

    /// Synthesizes a button press/release pair at window-local coordinates.
    /// The release carries the button's state mask, matching real input.
    pub fn send_mouse_click(&self, window: Window, x: i16, y: i16, button: MouseButton) -> bool {
        let Some(display) = self.display.as_ref() else {
            return false;
        };
        if window == 0 {
            return false;
        }
        match try_send_mouse_click(display, window, x, y, button) {
            Ok(()) => true,
            Err(err) => {
                warn!("sending {button:?} click to 0x{window:x} failed: {err:#}");
                false
            }
        }
    }

    /// Subscribes to input events on the window and the root and arms the
    /// polling fallbacks. The host drives `poll_recovered_events` afterwards.
    pub fn start_event_monitoring(&mut self, window: Window) -> bool {
        let Some(display) = self.display.as_ref() else {
            return false;
        };
        if window == 0 {
            return false;
        }
        if let Err(err) = select_monitor_input(display, window) {
            debug!("selecting input on 0x{window:x} failed: {err:#}");
        }
        self.monitor = MonitorState {
            window,
            active: true,
            right_button: EdgeDetector::default(),
            space: KeyDebounce::new(KEY_REPEAT_HOLDOFF),
            space_keycode: display.keymap.get(&SPACE_KEYSYM).copied(),
        };
        debug!("started event monitoring for window 0x{window:x}");
        true
    }

    /// Releases any pointer grab, removes the root subscription and clears
    /// all monitoring state. Safe to call when not monitoring.
    pub fn stop_event_monitoring(&mut self) {
        if self.monitor.active {
            if let Some(display) = self.display.as_ref() {
                let conn = &display.conn;
                let clear = ChangeWindowAttributesAux::new().event_mask(EventMask::NO_EVENT);
                let _ = conn.ungrab_pointer(CURRENT_TIME);
                let _ = conn.change_window_attributes(display.root, &clear);
                let _ = conn.flush();
            }
            debug!("stopped event monitoring");
        }
        self.monitor = MonitorState::default();
    }

    /// One monitoring tick: re-subscribe, drain the queue, then poll pointer
    /// and keyboard state for input the queue never delivered. Queued and
    /// polled detections feed one sink; a press already reported from the
    /// queue this tick suppresses the polled edge for the same press.
    pub fn poll_recovered_events(&mut self) -> Vec<RecoveredEvent> {
        let mut recovered = Vec::new();
        let Some(display) = self.display.as_ref() else {
            return recovered;
        };
        if !self.monitor.active || self.monitor.window == 0 {
            return recovered;
        }
        let window = self.monitor.window;

        // Some window managers clear foreign event selections on reparent;
        // re-arm every tick.
        if let Err(err) = select_monitor_input(display, window) {
            debug!("re-selecting input failed: {err:#}");
        }

        let mut pointer_reported = false;
        loop {
            let event = match display.conn.poll_for_event() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    warn!("reading the event queue failed: {err}");
                    break;
                }
            };
            let Event::ButtonPress(press) = event else {
                continue;
            };
            // Skip events we injected ourselves (top bit marks SendEvent).
            if press.response_type & 0x80 != 0 {
                continue;
            }
            if press.detail != MouseButton::Right.detail() {
                continue;
            }
            if !is_descendant_of(display, press.event, window) {
                continue;
            }
            // Query the size fresh; the window may have just been resized.
            let Ok((width, height)) = window_geometry(display, window) else {
                continue;
            };
            debug!(
                "right-button press queued at root {},{} on monitored window",
                press.root_x, press.root_y
            );
            recovered.push(RecoveredEvent::PointerPress {
                root_x: press.root_x,
                root_y: press.root_y,
                window_width: width,
                window_height: height,
                window,
            });
            pointer_reported = true;
        }

        // Pointer fallback: a grab can keep presses out of the queue entirely.
        match query_pointer_state(display) {
            Ok((root_x, root_y, right_down)) => {
                if self.monitor.right_button.rising(right_down) && !pointer_reported {
                    if let Some(event) = polled_press_in_window(display, window, root_x, root_y) {
                        debug!("right-button press recovered via pointer polling");
                        recovered.push(event);
                    }
                }
            }
            Err(err) => debug!("pointer poll failed: {err:#}"),
        }

        // Keyboard fallback: watch the space key through the state bitmap.
        if let Some(keycode) = self.monitor.space_keycode {
            match query_key_down(display, keycode) {
                Ok(down) => {
                    if self.monitor.space.observe(down, Instant::now()) {
                        debug!("space press recovered via keymap polling");
                        recovered.push(RecoveredEvent::KeyPress {
                            keysym: SPACE_KEYSYM,
                            window,
                        });
                    }
                }
                Err(err) => debug!("keymap poll failed: {err:#}"),
            }
        }

        recovered
    }

    /// Translates root coordinates into the window's local space.
    pub fn window_local(&self, window: Window, root_x: i16, root_y: i16) -> Option<(i32, i32)> {
        let display = self.display.as_ref()?;
        if window == 0 {
            return None;
        }
        translate(display, display.root, window, root_x, root_y)
            .map(|(x, y)| (i32::from(x), i32::from(y)))
    }

    /// Creates a plain child window of `parent` to serve as the embedding
    /// container, mapped and filled black.
    pub fn create_container(
        &self,
        parent: Window,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Option<Window> {
        let display = self.display.as_ref()?;
        if parent == 0 {
            return None;
        }
        match try_create_container(display, parent, x, y, width, height) {
            Ok(window) => {
                debug!("created container window 0x{window:x}");
                Some(window)
            }
            Err(err) => {
                warn!("creating the container window failed: {err:#}");
                None
            }
        }
    }

    pub fn move_container(&self, window: Window, x: i32, y: i32, width: u32, height: u32) -> bool {
        let Some(display) = self.display.as_ref() else {
            return false;
        };
        if window == 0 {
            return false;
        }
        let aux = ConfigureWindowAux::new()
            .x(x)
            .y(y)
            .width(width.max(1))
            .height(height.max(1));
        match display
            .conn
            .configure_window(window, &aux)
            .and_then(|_| display.conn.flush())
        {
            Ok(()) => true,
            Err(err) => {
                warn!("moving container 0x{window:x} failed: {err}");
                false
            }
        }
    }

    pub fn set_window_mapped(&self, window: Window, mapped: bool) -> bool {
        let Some(display) = self.display.as_ref() else {
            return false;
        };
        if window == 0 {
            return false;
        }
        let result = if mapped {
            display.conn.map_window(window)
        } else {
            display.conn.unmap_window(window)
        };
        match result.and_then(|_| display.conn.flush()) {
            Ok(()) => true,
            Err(err) => {
                warn!("(un)mapping window 0x{window:x} failed: {err}");
                false
            }
        }
    }
}

impl Drop for X11EmbedHelper {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn open_display() -> Result<DisplayState> {
    let display_env = std::env::var("DISPLAY").unwrap_or_default();
    if display_env.is_empty() {
        bail!("DISPLAY is not set");
    }
    let (conn, screen_num) =
        x11rb::connect(None).context("failed to connect to the X server")?;
    let (root, black_pixel) = {
        let screen = &conn.setup().roots[screen_num];
        (screen.root, screen.black_pixel)
    };
    let net_wm_name = conn.intern_atom(false, b"_NET_WM_NAME")?.reply()?.atom;
    let utf8_string = conn.intern_atom(false, b"UTF8_STRING")?.reply()?.atom;
    let keymap = build_keysym_table(&conn).context("failed to read the keyboard mapping")?;
    Ok(DisplayState {
        conn,
        root,
        black_pixel,
        net_wm_name,
        utf8_string,
        keymap,
    })
}

fn build_keysym_table(conn: &RustConnection) -> Result<HashMap<u32, u8>> {
    let min = conn.setup().min_keycode;
    let max = conn.setup().max_keycode;
    let mapping = conn.get_keyboard_mapping(min, max - min + 1)?.reply()?;
    let per = mapping.keysyms_per_keycode as usize;
    let mut table = HashMap::new();
    if per == 0 {
        return Ok(table);
    }
    for (i, chunk) in mapping.keysyms.chunks(per).enumerate() {
        for &keysym in chunk {
            if keysym != 0 {
                table.entry(keysym).or_insert(min + i as u8);
            }
        }
    }
    Ok(table)
}

fn monitored_event_mask() -> EventMask {
    EventMask::BUTTON_PRESS
        | EventMask::BUTTON_RELEASE
        | EventMask::KEY_PRESS
        | EventMask::KEY_RELEASE
}

fn select_monitor_input(display: &DisplayState, window: Window) -> Result<()> {
    let aux = ChangeWindowAttributesAux::new().event_mask(monitored_event_mask());
    display.conn.change_window_attributes(window, &aux)?;
    display.conn.change_window_attributes(display.root, &aux)?;
    display.conn.flush()?;
    Ok(())
}

fn window_title(display: &DisplayState, window: Window) -> Option<String> {
    let candidates = [
        (display.net_wm_name, display.utf8_string),
        (
            u32::from(AtomEnum::WM_NAME),
            u32::from(AtomEnum::STRING),
        ),
    ];
    for (property, type_) in candidates {
        let Ok(cookie) = display
            .conn
            .get_property(false, window, property, type_, 0, 1024)
        else {
            return None;
        };
        let Ok(reply) = cookie.reply() else {
            continue;
        };
        if reply.value.is_empty() {
            continue;
        }
        if let Ok(title) = String::from_utf8(reply.value) {
            return Some(title);
        }
    }
    None
}

fn find_window_recursive(
    display: &DisplayState,
    window: Window,
    hint: &str,
) -> Result<Option<Window>> {
    if let Some(title) = window_title(display, window) {
        if title_matches(&title, hint) || is_player_window_title(&title) {
            debug!("matched window 0x{window:x} titled {title:?}");
            return Ok(Some(window));
        }
    }
    let tree = match display.conn.query_tree(window)?.reply() {
        Ok(tree) => tree,
        // The window vanished mid-walk; skip its subtree.
        Err(_) => return Ok(None),
    };
    for child in tree.children {
        if let Some(found) = find_window_recursive(display, child, hint)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn try_embed(display: &DisplayState, child: Window, parent: Window) -> Result<bool> {
    let conn = &display.conn;
    // The handle may have gone stale between location and embedding.
    if conn.get_window_attributes(child)?.reply().is_err() {
        warn!("window 0x{child:x} no longer exists, skipping embed");
        return Ok(false);
    }
    conn.unmap_window(child)?;
    conn.flush()?;
    conn.reparent_window(child, parent, 0, 0)?;
    conn.flush()?;
    conn.configure_window(child, &ConfigureWindowAux::new().border_width(0))?;
    conn.map_window(child)?;
    conn.flush()?;
    info!("embedded window 0x{child:x} into container 0x{parent:x}");
    Ok(true)
}

fn try_send_key(display: &DisplayState, window: Window, key: &str) -> Result<bool> {
    let Some(keysym) = keysym_from_name(key) else {
        warn!("unknown key name {key:?}");
        return Ok(false);
    };
    let Some(&keycode) = display.keymap.get(&keysym) else {
        warn!("no keycode for {key:?} in the current keyboard layout");
        return Ok(false);
    };
    let press = KeyPressEvent {
        response_type: KEY_PRESS_EVENT,
        detail: keycode,
        sequence: 0,
        time: CURRENT_TIME,
        root: display.root,
        event: window,
        child: NONE,
        root_x: 1,
        root_y: 1,
        event_x: 1,
        event_y: 1,
        state: KeyButMask::default(),
        same_screen: true,
    };
    display
        .conn
        .send_event(true, window, EventMask::KEY_PRESS, press)?;
    let release = KeyPressEvent {
        response_type: KEY_RELEASE_EVENT,
        ..press
    };
    display
        .conn
        .send_event(true, window, EventMask::KEY_RELEASE, release)?;
    display.conn.flush()?;
    Ok(true)
}

fn try_send_mouse_click(
    display: &DisplayState,
    window: Window,
    x: i16,
    y: i16,
    button: MouseButton,
) -> Result<()> {
    let press = ButtonPressEvent {
        response_type: BUTTON_PRESS_EVENT,
        detail: button.detail(),
        sequence: 0,
        time: CURRENT_TIME,
        root: display.root,
        event: window,
        child: NONE,
        root_x: 1,
        root_y: 1,
        event_x: x,
        event_y: y,
        state: KeyButMask::default(),
        same_screen: true,
    };
    display
        .conn
        .send_event(true, window, EventMask::BUTTON_PRESS, press)?;
    let release = ButtonPressEvent {
        response_type: BUTTON_RELEASE_EVENT,
        // The receiver must see the button as held during the release.
        state: button.state_mask(),
        ..press
    };
    display
        .conn
        .send_event(true, window, EventMask::BUTTON_RELEASE, release)?;
    display.conn.flush()?;
    Ok(())
}

fn try_create_container(
    display: &DisplayState,
    parent: Window,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
) -> Result<Window> {
    let conn = &display.conn;
    let window = conn.generate_id()?;
    let aux = CreateWindowAux::new().background_pixel(display.black_pixel);
    conn.create_window(
        x11rb::COPY_DEPTH_FROM_PARENT,
        window,
        parent,
        x as i16,
        y as i16,
        width.max(1) as u16,
        height.max(1) as u16,
        0,
        WindowClass::INPUT_OUTPUT,
        x11rb::COPY_FROM_PARENT,
        &aux,
    )?;
    conn.map_window(window)?;
    conn.flush()?;
    Ok(window)
}

fn window_geometry(display: &DisplayState, window: Window) -> Result<(u16, u16)> {
    let geometry = display.conn.get_geometry(window)?.reply()?;
    Ok((geometry.width, geometry.height))
}

fn query_pointer_state(display: &DisplayState) -> Result<(i16, i16, bool)> {
    let reply = display.conn.query_pointer(display.root)?.reply()?;
    let right_down = u16::from(reply.mask & KeyButMask::BUTTON3) != 0;
    Ok((reply.root_x, reply.root_y, right_down))
}

fn polled_press_in_window(
    display: &DisplayState,
    window: Window,
    root_x: i16,
    root_y: i16,
) -> Option<RecoveredEvent> {
    let (local_x, local_y) = translate(display, display.root, window, root_x, root_y)?;
    let (width, height) = window_geometry(display, window).ok()?;
    let inside = local_x >= 0
        && local_y >= 0
        && (local_x as u16) < width
        && (local_y as u16) < height;
    if !inside {
        return None;
    }
    Some(RecoveredEvent::PointerPress {
        root_x,
        root_y,
        window_width: width,
        window_height: height,
        window,
    })
}

fn query_key_down(display: &DisplayState, keycode: u8) -> Result<bool> {
    let reply = display.conn.query_keymap()?.reply()?;
    let byte = (keycode / 8) as usize;
    let bit = keycode % 8;
    Ok(reply
        .keys
        .get(byte)
        .map_or(false, |bits| bits & (1 << bit) != 0))
}

fn translate(
    display: &DisplayState,
    src: Window,
    dst: Window,
    x: i16,
    y: i16,
) -> Option<(i16, i16)> {
    let reply = display
        .conn
        .translate_coordinates(src, dst, x, y)
        .ok()?
        .reply()
        .ok()?;
    Some((reply.dst_x, reply.dst_y))
}

fn is_descendant_of(display: &DisplayState, mut window: Window, ancestor: Window) -> bool {
    if window == ancestor {
        return true;
    }
    // The external process may deliver events to one of its sub-windows.
    loop {
        let Ok(cookie) = display.conn.query_tree(window) else {
            return false;
        };
        let Ok(reply) = cookie.reply() else {
            return false;
        };
        if reply.parent == ancestor {
            return true;
        }
        if reply.parent == 0 || reply.parent == reply.root {
            return false;
        }
        window = reply.parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_matches_exact_and_substring() {
        assert!(title_matches("ffplay_movie", "ffplay_movie"));
        assert!(title_matches("ffplay_movie - paused", "ffplay_movie"));
        assert!(!title_matches("mpv_movie", "ffplay_movie"));
        assert!(!title_matches("anything", ""));
    }

    #[test]
    fn player_title_fallback_needs_name_and_extension() {
        assert!(is_player_window_title("ffplay holiday.mp4"));
        assert!(is_player_window_title("FFplay: clip.WEBM"));
        assert!(!is_player_window_title("ffplay"));
        assert!(!is_player_window_title("notes.mp4 in editor"));
    }

    #[test]
    fn keysym_lookup_covers_controller_vocabulary() {
        assert_eq!(keysym_from_name("p"), Some(u32::from(b'p')));
        assert_eq!(keysym_from_name("s"), Some(u32::from(b's')));
        assert_eq!(keysym_from_name("0"), Some(u32::from(b'0')));
        assert_eq!(keysym_from_name("9"), Some(u32::from(b'9')));
        assert_eq!(keysym_from_name("space"), Some(SPACE_KEYSYM));
        assert_eq!(keysym_from_name("Left"), Some(0xff51));
        assert_eq!(keysym_from_name("no_such_key"), None);
    }

    #[test]
    fn edge_detector_reports_each_press_once() {
        let mut edge = EdgeDetector::default();
        let observations = [false, true, true, false];
        let presses = observations
            .iter()
            .filter(|&&down| edge.rising(down))
            .count();
        assert_eq!(presses, 1);
    }

    #[test]
    fn debounce_merges_presses_inside_the_holdoff() {
        let hold_off = Duration::from_millis(200);
        let mut debounce = KeyDebounce::new(hold_off);
        let start = Instant::now();

        assert!(debounce.observe(true, start));
        // Same press still held on the next tick.
        assert!(!debounce.observe(true, start + Duration::from_millis(50)));
        // Released, then pressed again too quickly.
        assert!(!debounce.observe(false, start + Duration::from_millis(100)));
        assert!(!debounce.observe(true, start + Duration::from_millis(150)));
    }

    #[test]
    fn debounce_accepts_presses_past_the_holdoff() {
        let hold_off = Duration::from_millis(200);
        let mut debounce = KeyDebounce::new(hold_off);
        let start = Instant::now();

        assert!(debounce.observe(true, start));
        assert!(!debounce.observe(false, start + Duration::from_millis(60)));
        assert!(debounce.observe(true, start + hold_off));
    }
}
