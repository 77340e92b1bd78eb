//! Widget bindings and the input events they react to.

use crate::dom::NodeId;
use std::fmt;

/// Stable handle for a wired snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WidgetId(pub(super) usize);

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "widget#{}", self.0)
    }
}

/// Run lifecycle of a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidgetState {
    #[default]
    Idle,
    Running,
    /// Last run failed for infrastructure reasons
    Unavailable,
}

/// The elements and data behind one runnable snippet.
#[derive(Debug, Clone)]
pub struct WidgetBinding {
    pub(super) source_element: NodeId,
    pub(super) input: NodeId,
    pub(super) output: NodeId,
    pub(super) trigger: NodeId,
    pub(super) source: String,
    pub(super) options: Vec<String>,
    pub(super) state: WidgetState,
}

impl WidgetBinding {
    /// The original snippet element, now hidden.
    pub fn source_element(&self) -> NodeId {
        self.source_element
    }

    /// The editable `<textarea>`.
    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn trigger(&self) -> NodeId {
        self.trigger
    }

    /// Resolved input data handed to the interpreter.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn state(&self) -> WidgetState {
        self.state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Char(char),
    Other,
}

/// A key press inside a widget's input, with its modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            meta: false,
            shift: false,
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// Enter with Ctrl, Meta or Shift runs the snippet.
    pub fn is_run_shortcut(&self) -> bool {
        self.key == Key::Enter && (self.ctrl || self.meta || self.shift)
    }
}

/// What happened to a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The press ran the snippet; the default action is suppressed
    Handled,
    Ignored,
}

/// Rows needed to show `text` without scrolling.
pub fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_shortcut() {
        assert!(KeyEvent::new(Key::Enter).with_ctrl().is_run_shortcut());
        assert!(KeyEvent::new(Key::Enter).with_meta().is_run_shortcut());
        assert!(KeyEvent::new(Key::Enter).with_shift().is_run_shortcut());
        assert!(!KeyEvent::new(Key::Enter).is_run_shortcut());
        assert!(!KeyEvent::new(Key::Char('a')).with_ctrl().is_run_shortcut());
    }

    #[test]
    fn test_line_count() {
        assert_eq!(line_count(""), 1);
        assert_eq!(line_count(".a"), 1);
        assert_eq!(line_count(".a |\n.b\n"), 3);
    }
}
