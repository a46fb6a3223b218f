//! Keyboard producer for the manual driver.
//!
//! Runs on its own thread, reading terminal key events and committing them
//! to the [`SharedInput`] buffer. The session never waits on this thread.
//!
//! Key releases are only reported by terminals that support the keyboard
//! enhancement protocol; elsewhere space returns the car to neutral.

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use scrc_core::SharedInput;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

const STEER_STEP: f64 = 0.5;
const THROTTLE_STEP: f64 = 0.7;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Operator intent decoded from one key event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    Steer(f64),
    Throttle(f64),
    Shift(i32),
    Neutral,
    Quit,
}

/// Maps a key event to an action.
pub fn handle_key_event(key: KeyEvent) -> Option<KeyAction> {
    if should_quit(key) {
        return Some(KeyAction::Quit);
    }

    if key.kind == KeyEventKind::Release {
        return match key.code {
            KeyCode::Left | KeyCode::Right => Some(KeyAction::Steer(0.0)),
            KeyCode::Up | KeyCode::Down => Some(KeyAction::Throttle(0.0)),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Left => Some(KeyAction::Steer(STEER_STEP)),
        KeyCode::Right => Some(KeyAction::Steer(-STEER_STEP)),
        KeyCode::Up => Some(KeyAction::Throttle(THROTTLE_STEP)),
        KeyCode::Down => Some(KeyAction::Throttle(-THROTTLE_STEP)),
        KeyCode::Char('v') | KeyCode::Char('V') => Some(KeyAction::Shift(1)),
        KeyCode::Char('b') | KeyCode::Char('B') => Some(KeyAction::Shift(-1)),
        KeyCode::Char(' ') => Some(KeyAction::Neutral),
        _ => None,
    }
}

/// Check if key should quit the client.
pub fn should_quit(key: KeyEvent) -> bool {
    key.kind != KeyEventKind::Release
        && (matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q'))
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)))
}

/// Commits an action to the input buffer. Returns `false` on quit.
pub fn apply(action: KeyAction, input: &SharedInput) -> bool {
    match action {
        KeyAction::Steer(steer) => input.set_steer(steer),
        KeyAction::Throttle(throttle) => input.set_throttle(throttle),
        KeyAction::Shift(delta) => input.shift(delta),
        KeyAction::Neutral => input.release(),
        KeyAction::Quit => return false,
    }
    true
}

/// Handle to the running keyboard thread. Dropping it stops the thread
/// and restores the terminal.
pub struct Keyboard {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Keyboard {
    /// Puts the terminal in raw mode and starts reading keys.
    ///
    /// `quit` is notified when the operator asks to leave.
    pub fn spawn(input: SharedInput, quit: Arc<Notify>) -> io::Result<Self> {
        enable_raw_mode()?;
        let enhanced = supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        } else {
            info!("Terminal does not report key releases, press space to return to neutral");
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name("keyboard".to_string())
            .spawn(move || {
                if let Err(e) = read_keys(&input, &quit, &thread_stop) {
                    warn!("Keyboard input stopped: {}", e);
                }
                if enhanced {
                    let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
                }
                let _ = disable_raw_mode();
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for Keyboard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Writer that turns `\n` into `\r\n` so log lines stay aligned while the
/// terminal is in raw mode.
pub struct RawModeWriter<W: Write> {
    inner: W,
}

impl<W: Write> RawModeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for RawModeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for line in buf.split_inclusive(|&b| b == b'\n') {
            match line.strip_suffix(b"\n") {
                Some(body) => {
                    self.inner.write_all(body)?;
                    self.inner.write_all(b"\r\n")?;
                }
                None => self.inner.write_all(line)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Log writer for the subscriber while the keyboard holds the terminal.
pub fn raw_mode_stderr() -> RawModeWriter<io::Stderr> {
    RawModeWriter::new(io::stderr())
}

fn read_keys(input: &SharedInput, quit: &Notify, stop: &AtomicBool) -> io::Result<()> {
    while !stop.load(Ordering::Relaxed) {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        let Some(action) = handle_key_event(key) else {
            continue;
        };

        debug!("Key {:?} -> {:?}", key.code, action);
        if !apply(action, input) {
            quit.notify_one();
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn release(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(handle_key_event(KeyEvent::from(KeyCode::Left)), Some(KeyAction::Steer(0.5)));
        assert_eq!(handle_key_event(KeyEvent::from(KeyCode::Right)), Some(KeyAction::Steer(-0.5)));
        assert_eq!(handle_key_event(KeyEvent::from(KeyCode::Up)), Some(KeyAction::Throttle(0.7)));
        assert_eq!(handle_key_event(KeyEvent::from(KeyCode::Down)), Some(KeyAction::Throttle(-0.7)));
    }

    #[test]
    fn test_gear_keys() {
        assert_eq!(handle_key_event(KeyEvent::from(KeyCode::Char('v'))), Some(KeyAction::Shift(1)));
        assert_eq!(handle_key_event(KeyEvent::from(KeyCode::Char('B'))), Some(KeyAction::Shift(-1)));
        assert_eq!(handle_key_event(KeyEvent::from(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_release_returns_axis_to_neutral() {
        assert_eq!(handle_key_event(release(KeyCode::Left)), Some(KeyAction::Steer(0.0)));
        assert_eq!(handle_key_event(release(KeyCode::Up)), Some(KeyAction::Throttle(0.0)));
        assert_eq!(handle_key_event(release(KeyCode::Char('v'))), None);
    }

    #[test]
    fn test_quit_keys() {
        assert!(should_quit(KeyEvent::from(KeyCode::Char('q'))));
        assert!(should_quit(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(!should_quit(KeyEvent::from(KeyCode::Char('c'))));
        assert!(!should_quit(release(KeyCode::Char('q'))));
    }

    #[test]
    fn test_apply_commits_to_input() {
        let input = SharedInput::new();
        assert!(apply(KeyAction::Steer(0.5), &input));
        assert!(apply(KeyAction::Throttle(-0.7), &input));
        assert!(apply(KeyAction::Shift(1), &input));

        let latest = input.latest();
        assert_eq!(latest.steer, 0.5);
        assert_eq!(latest.throttle, -0.7);
        assert_eq!(latest.pending_shift, 1);

        assert!(apply(KeyAction::Neutral, &input));
        assert_eq!(input.latest().throttle, 0.0);
        assert!(!apply(KeyAction::Quit, &input));
    }

    #[test]
    fn test_raw_mode_writer_returns_carriage() {
        let mut buf = Vec::new();
        let mut writer = RawModeWriter::new(&mut buf);
        writer.write_all(b"a\nb\n").unwrap();
        writer.write_all(b"partial").unwrap();
        writer.write_all(b" line\n").unwrap();
        drop(writer);

        let written = String::from_utf8(buf).unwrap();
        assert_eq!(written, "a\r\nb\r\npartial line\r\n");
    }
}
