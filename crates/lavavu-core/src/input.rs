//! Window input translated to script commands
//!
//! A window host reports keyboard, mouse and close events; each becomes a
//! `key ...` or `mouse ...` script line that the backend interprets:
//! - `key key=<code>,modifiers=<CSA>,x=<x>,y=<y>`
//! - `mouse mouse=<down|up|move|scroll>,button=<n>,modifiers=<CSA>,x=<x>,y=<y>[,spin=<n>]`

use serde::{Deserialize, Serialize};

/// Keys with a dedicated code; printable keys are sent as their character
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Char(char),
    Escape,
    Enter,
    Tab,
    Delete,
    Backspace,
    F1,
    F2,
    Left,
    Right,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
}

impl Key {
    pub fn code(&self) -> u32 {
        match self {
            Key::Char(c) => *c as u32,
            Key::Backspace => 8,
            Key::Tab => 9,
            Key::Enter => 13,
            Key::Up => 17,
            Key::Down => 18,
            Key::Left => 19,
            Key::Right => 20,
            Key::Home => 22,
            Key::End => 23,
            Key::PageUp => 24,
            Key::PageDown => 25,
            Key::Escape => 27,
            Key::F1 => 30,
            Key::F2 => 31,
            Key::Delete => 127,
        }
    }
}

/// Modifier key state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Flag letters as the script parser expects them: `C`, `S`, `A`
    pub fn flags(&self) -> String {
        let mut out = String::new();
        if self.ctrl {
            out.push('C');
        }
        if self.shift {
            out.push('S');
        }
        if self.alt {
            out.push('A');
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub fn code(&self) -> u32 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }
}

/// Event reported by a window host
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WindowEvent {
    Key {
        key: Key,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    },
    /// Unicode text input
    Text { ch: char, x: i32, y: i32 },
    MousePress {
        button: MouseButton,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    },
    MouseRelease {
        button: MouseButton,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    },
    /// Motion, with or without a button held
    MouseMove { x: i32, y: i32, modifiers: Modifiers },
    Scroll {
        delta: i32,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    },
    Resize { width: u32, height: u32 },
    Close,
}

/// What to do when the window is closed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosePolicy {
    /// Stop the render loop
    #[default]
    Quit,
    /// Keep running with the window hidden, as inside a notebook
    Hide,
}

impl ClosePolicy {
    pub fn for_environment(notebook: bool) -> Self {
        if notebook {
            ClosePolicy::Hide
        } else {
            ClosePolicy::Quit
        }
    }
}

fn mouse_command(
    action: &str,
    button: Option<MouseButton>,
    x: i32,
    y: i32,
    modifiers: Modifiers,
) -> String {
    let button = button.map_or(0, |b| b.code());
    format!(
        "mouse mouse={},button={},modifiers={},x={},y={}",
        action,
        button,
        modifiers.flags(),
        x,
        y
    )
}

/// Script line for an input event; `None` for events handled by the host
pub fn to_command(event: &WindowEvent) -> Option<String> {
    let line = match event {
        WindowEvent::Key { key, x, y, modifiers } => format!(
            "key key={},modifiers={},x={},y={}",
            key.code(),
            modifiers.flags(),
            x,
            y
        ),
        WindowEvent::Text { ch, x, y } => {
            format!("key key={},modifiers=,x={},y={}", *ch as u32, x, y)
        }
        WindowEvent::MousePress {
            button,
            x,
            y,
            modifiers,
        } => mouse_command("down", Some(*button), *x, *y, *modifiers),
        WindowEvent::MouseRelease {
            button,
            x,
            y,
            modifiers,
        } => mouse_command("up", Some(*button), *x, *y, *modifiers),
        WindowEvent::MouseMove { x, y, modifiers } => {
            mouse_command("move", None, *x, *y, *modifiers)
        }
        WindowEvent::Scroll {
            delta,
            x,
            y,
            modifiers,
        } => format!("{},spin={}", mouse_command("scroll", None, *x, *y, *modifiers), delta),
        WindowEvent::Resize { width, height } => format!("resize {} {}", width, height),
        WindowEvent::Close => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_flags() {
        assert_eq!(Modifiers::new().flags(), "");
        assert_eq!(Modifiers::new().with_alt().with_ctrl().with_shift().flags(), "CSA");
    }

    #[test]
    fn test_key_command() {
        let event = WindowEvent::Key {
            key: Key::Char('r'),
            x: 10,
            y: 20,
            modifiers: Modifiers::new().with_ctrl(),
        };
        assert_eq!(to_command(&event).unwrap(), "key key=114,modifiers=C,x=10,y=20");
        let esc = WindowEvent::Key {
            key: Key::Escape,
            x: 0,
            y: 0,
            modifiers: Modifiers::new(),
        };
        assert!(to_command(&esc).unwrap().starts_with("key key=27,"));
    }

    #[test]
    fn test_mouse_commands() {
        let press = WindowEvent::MousePress {
            button: MouseButton::Right,
            x: 5,
            y: 6,
            modifiers: Modifiers::new().with_shift(),
        };
        assert_eq!(
            to_command(&press).unwrap(),
            "mouse mouse=down,button=2,modifiers=S,x=5,y=6"
        );
        let scroll = WindowEvent::Scroll {
            delta: -1,
            x: 0,
            y: 0,
            modifiers: Modifiers::new(),
        };
        assert!(to_command(&scroll).unwrap().ends_with(",spin=-1"));
    }

    #[test]
    fn test_close_policy() {
        assert_eq!(to_command(&WindowEvent::Close), None);
        assert_eq!(ClosePolicy::for_environment(true), ClosePolicy::Hide);
        assert_eq!(ClosePolicy::for_environment(false), ClosePolicy::Quit);
    }
}
