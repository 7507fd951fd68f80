//! Host-visible input events

use std::fmt;

/// An input or window event delivered to the host
///
/// Live events come from [`Host::poll_event`](crate::host::Host::poll_event);
/// during replay the same events are reconstructed from the demo stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    MouseMove { x: i32, y: i32 },
    /// `button` is the signed click code (1 left, 2 left double-click, 3 middle,
    /// -1 right, -2 right double-click)
    MouseDown { x: i32, y: i32, button: i8 },
    MouseUp { x: i32, y: i32, button: i8 },
    MouseWheel(i8),
    KeyDown(u8),
    KeyUp(u8),
    KeyChar(u16),
    Activate(bool),
    Minimize(bool),
    MouseEnter,
    MouseExit,
    Close,
}

impl InputEvent {
    /// Pointer position carried by the event, if any
    pub fn position(&self) -> Option<(i32, i32)> {
        match *self {
            InputEvent::MouseMove { x, y }
            | InputEvent::MouseDown { x, y, .. }
            | InputEvent::MouseUp { x, y, .. } => Some((x, y)),
            _ => None,
        }
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEvent::MouseMove { x, y } => write!(f, "mouse-move ({x}, {y})"),
            InputEvent::MouseDown { x, y, button } => write!(f, "mouse-down {button} ({x}, {y})"),
            InputEvent::MouseUp { x, y, button } => write!(f, "mouse-up {button} ({x}, {y})"),
            InputEvent::MouseWheel(delta) => write!(f, "mouse-wheel {delta:+}"),
            InputEvent::KeyDown(code) => write!(f, "key-down 0x{code:02X}"),
            InputEvent::KeyUp(code) => write!(f, "key-up 0x{code:02X}"),
            InputEvent::KeyChar(ch) => write!(f, "key-char U+{ch:04X}"),
            InputEvent::Activate(active) => write!(f, "activate {active}"),
            InputEvent::Minimize(minimized) => write!(f, "minimize {minimized}"),
            InputEvent::MouseEnter => f.write_str("mouse-enter"),
            InputEvent::MouseExit => f.write_str("mouse-exit"),
            InputEvent::Close => f.write_str("close"),
        }
    }
}
