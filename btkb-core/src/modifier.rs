//! Sticky keyboard modifiers (`MOD_*` tokens).
//!
//! A modifier stays down across reports until it is toggled again or
//! cleared with `MOD_RESET`. The report byte uses the HID boot layout:
//!
//! ```text
//! bit:   7      6     5       4      3     2     1       0
//!        RMETA  RALT  RSHIFT  RCTRL  LMETA LALT  LSHIFT  LCTRL
//! ```

use std::fmt;
use std::str::FromStr;

bitflags::bitflags! {
    /// One bit per modifier key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifier: u8 {
        const LEFTCTRL   = 1 << 0;
        const LEFTSHIFT  = 1 << 1;
        const LEFTALT    = 1 << 2;
        const LEFTMETA   = 1 << 3;
        const RIGHTCTRL  = 1 << 4;
        const RIGHTSHIFT = 1 << 5;
        const RIGHTALT   = 1 << 6;
        const RIGHTMETA  = 1 << 7;
    }
}

/// Canonical flag order, most significant bit first. The report byte is
/// these eight flags written out as a binary number.
pub const MODIFIER_ORDER: [(&str, Modifier); 8] = [
    ("RIGHTMETA", Modifier::RIGHTMETA),
    ("RIGHTALT", Modifier::RIGHTALT),
    ("RIGHTSHIFT", Modifier::RIGHTSHIFT),
    ("RIGHTCTRL", Modifier::RIGHTCTRL),
    ("LEFTMETA", Modifier::LEFTMETA),
    ("LEFTALT", Modifier::LEFTALT),
    ("LEFTSHIFT", Modifier::LEFTSHIFT),
    ("LEFTCTRL", Modifier::LEFTCTRL),
];

impl FromStr for Modifier {
    type Err = ();

    /// Parses a single modifier name as written after `MOD_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MODIFIER_ORDER
            .iter()
            .find(|(name, _)| *name == s)
            .map(|&(_, flag)| flag)
            .ok_or(())
    }
}

// ── ModifierState ────────────────────────────────────────────────

/// The modifier register owned by the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierState {
    held: Modifier,
}

impl ModifierState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one modifier.
    pub fn toggle(&mut self, modifier: Modifier) {
        self.held.toggle(modifier);
    }

    /// Flip the modifier called `name`.
    ///
    /// Returns `false` and changes nothing if the name is unknown.
    pub fn toggle_named(&mut self, name: &str) -> bool {
        match name.parse::<Modifier>() {
            Ok(modifier) => {
                self.toggle(modifier);
                true
            }
            Err(()) => false,
        }
    }

    /// Release every modifier.
    ///
    /// Returns `false` when nothing was held, so callers can skip a
    /// redundant update downstream.
    pub fn reset(&mut self) -> bool {
        if self.held.is_empty() {
            return false;
        }
        self.held = Modifier::empty();
        true
    }

    /// Whether `modifier` is currently held.
    pub fn is_held(&self, modifier: Modifier) -> bool {
        self.held.contains(modifier)
    }

    /// The modifier byte for the next report, derived from the flags in
    /// [`MODIFIER_ORDER`].
    pub fn byte(&self) -> u8 {
        MODIFIER_ORDER
            .iter()
            .fold(0u8, |acc, (_, flag)| (acc << 1) | u8::from(self.held.contains(*flag)))
    }
}

impl fmt::Display for ModifierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = MODIFIER_ORDER
            .iter()
            .filter(|(_, flag)| self.held.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("+"))
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
