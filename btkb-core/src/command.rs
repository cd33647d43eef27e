//! Command-line grammar.
//!
//! One line holds whitespace-separated tokens, executed left to right:
//!
//! | Token                 | Meaning                                         |
//! |-----------------------|-------------------------------------------------|
//! | `KEY_A+KEY_B+...`     | press the listed keys together (one report)     |
//! | `MOD_<NAME>`          | toggle a sticky modifier, e.g. `MOD_LEFTSHIFT`  |
//! | `MOD_RESET`           | release all sticky modifiers                    |
//! | `ACT_RELEASE`         | release all keys                                |
//! | `ACT_HOLD_<seconds>`  | pause the rest of the line (`ACT_HOLD` = 0 s)   |
//!
//! Parsing never fails. Tokens it cannot make sense of are dropped or
//! degraded so one bad command cannot stall the relay.

use std::fmt;
use std::time::Duration;

use tracing::trace;

use crate::modifier::Modifier;

const ACTION_PREFIX: &str = "ACT_";
const MODIFIER_PREFIX: &str = "MOD_";

// ── Op ───────────────────────────────────────────────────────────

/// One primitive operation parsed from a command token.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Press these keys together. Names are resolved when the report is
    /// encoded, so unknown ones are still carried here.
    Press(Vec<String>),
    /// Flip one sticky modifier.
    Toggle(Modifier),
    /// Clear all sticky modifiers.
    ResetModifiers,
    /// Release every key.
    Release,
    /// Pause before the next token.
    Hold(Duration),
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Press(keys) => write!(f, "press {}", keys.join("+")),
            Op::Toggle(m) => write!(f, "toggle {m:?}"),
            Op::ResetModifiers => write!(f, "reset modifiers"),
            Op::Release => write!(f, "release"),
            Op::Hold(d) => write!(f, "hold {d:?}"),
        }
    }
}

// ── Parsing ──────────────────────────────────────────────────────

/// Parse a whole command line into ops, in token order.
pub fn parse_line(line: &str) -> Vec<Op> {
    line.split_whitespace().filter_map(parse_token).collect()
}

/// Parse a single token. Returns `None` for tokens that do nothing.
pub fn parse_token(token: &str) -> Option<Op> {
    if let Some(action) = token.strip_prefix(ACTION_PREFIX) {
        return parse_action(action);
    }
    if let Some(name) = token.strip_prefix(MODIFIER_PREFIX) {
        return parse_modifier(name);
    }
    let keys = token
        .split('+')
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect();
    Some(Op::Press(keys))
}

fn parse_action(action: &str) -> Option<Op> {
    if action == "RELEASE" {
        return Some(Op::Release);
    }
    if let Some(rest) = action.strip_prefix("HOLD") {
        let secs = rest.strip_prefix('_').unwrap_or(rest);
        return Some(Op::Hold(parse_hold_duration(secs)));
    }
    trace!("ignoring unknown action ACT_{action}");
    None
}

fn parse_modifier(name: &str) -> Option<Op> {
    if name == "RESET" {
        return Some(Op::ResetModifiers);
    }
    match name.parse::<Modifier>() {
        Ok(modifier) => Some(Op::Toggle(modifier)),
        Err(()) => {
            trace!("ignoring unknown modifier MOD_{name}");
            None
        }
    }
}

/// Seconds as a decimal number. Missing, unparseable, negative or
/// non-finite values mean no pause.
fn parse_hold_duration(secs: &str) -> Duration {
    secs.parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .unwrap_or(Duration::ZERO)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn press(keys: &[&str]) -> Op {
        Op::Press(keys.iter().map(|k| k.to_string()).collect())
    }

    #[test]
    fn combo_and_release() {
        assert_eq!(
            parse_line("KEY_CTRL+KEY_ALT+KEY_DELETE ACT_RELEASE"),
            vec![press(&["KEY_CTRL", "KEY_ALT", "KEY_DELETE"]), Op::Release]
        );
    }

    #[test]
    fn tokens_keep_line_order() {
        assert_eq!(
            parse_line("MOD_LEFTSHIFT KEY_A ACT_HOLD_1 ACT_RELEASE MOD_RESET"),
            vec![
                Op::Toggle(Modifier::LEFTSHIFT),
                press(&["KEY_A"]),
                Op::Hold(Duration::from_secs(1)),
                Op::Release,
                Op::ResetModifiers,
            ]
        );
    }

    #[test]
    fn hold_durations() {
        assert_eq!(parse_token("ACT_HOLD_0.25"), Some(Op::Hold(Duration::from_millis(250))));
        assert_eq!(parse_token("ACT_HOLD_2"), Some(Op::Hold(Duration::from_secs(2))));
        assert_eq!(parse_token("ACT_HOLD"), Some(Op::Hold(Duration::ZERO)));
        assert_eq!(parse_token("ACT_HOLD_"), Some(Op::Hold(Duration::ZERO)));
        assert_eq!(parse_token("ACT_HOLD_abc"), Some(Op::Hold(Duration::ZERO)));
        assert_eq!(parse_token("ACT_HOLD_-3"), Some(Op::Hold(Duration::ZERO)));
        assert_eq!(parse_token("ACT_HOLD_NaN"), Some(Op::Hold(Duration::ZERO)));
        assert_eq!(parse_token("ACT_HOLD_inf"), Some(Op::Hold(Duration::ZERO)));
    }

    #[test]
    fn unknown_actions_and_modifiers_are_dropped() {
        assert_eq!(parse_token("ACT_JUMP"), None);
        assert_eq!(parse_token("MOD_HYPER"), None);
        assert_eq!(parse_line("ACT_JUMP MOD_HYPER ACT_RELEASE"), vec![Op::Release]);
    }

    #[test]
    fn unknown_keys_survive_parsing() {
        // Keymap lookup happens at encode time.
        assert_eq!(parse_token("KEY_A+KEY_NOPE"), Some(press(&["KEY_A", "KEY_NOPE"])));
    }

    #[test]
    fn empty_segments_in_combo_are_skipped() {
        assert_eq!(parse_token("KEY_A++KEY_B+"), Some(press(&["KEY_A", "KEY_B"])));
    }

    #[test]
    fn whitespace_only_lines() {
        assert!(parse_line("").is_empty());
        assert!(parse_line("   \t \n").is_empty());
        assert_eq!(parse_line("  KEY_A\t\tKEY_B \r\n"), vec![press(&["KEY_A"]), press(&["KEY_B"])]);
    }

    #[test]
    fn display() {
        assert_eq!(press(&["KEY_A", "KEY_B"]).to_string(), "press KEY_A+KEY_B");
        assert_eq!(Op::Release.to_string(), "release");
    }
}
