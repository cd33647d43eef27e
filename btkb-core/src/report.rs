//! HID keyboard input reports as sent over the Bluetooth interrupt channel.
//!
//! Layout:
//! ```text
//! Byte 0: 0xA1  HIDP transaction header (DATA | Input)
//! Byte 1: 0x01  Report ID (keyboard)
//! Byte 2: Modifier bitfield (see `modifier`)
//! Byte 3: Reserved (0x00)
//! Byte 4..: 0-6 key usage codes, never padded
//! ```
//!
//! The release report stops after the modifier byte: `A1 01 00`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::keymap;
use crate::modifier::ModifierState;

/// HIDP header byte for an input report on the interrupt channel.
pub const HIDP_INPUT_HEADER: u8 = 0xA1;

/// Report ID of the keyboard collection.
pub const KEYBOARD_REPORT_ID: u8 = 0x01;

/// Maximum simultaneous keys in one report (boot protocol).
pub const MAX_KEYS: usize = 6;

/// Header + modifier + reserved.
pub const REPORT_PREFIX_LEN: usize = 4;

/// An encoded keyboard report, ready to hand to the peripheral session.
#[derive(Clone, PartialEq, Eq)]
pub struct Report {
    bytes: Bytes,
}

impl Report {
    /// Encode a key press with the current modifiers.
    ///
    /// Key names are resolved through the keymap. Unknown names are skipped
    /// without taking a slot; anything past the sixth recognised key is
    /// dropped.
    pub fn encode<S: AsRef<str>>(modifiers: &ModifierState, keys: &[S]) -> Self {
        let mut buf = BytesMut::with_capacity(REPORT_PREFIX_LEN + MAX_KEYS);
        buf.put_u8(HIDP_INPUT_HEADER);
        buf.put_u8(KEYBOARD_REPORT_ID);
        buf.put_u8(modifiers.byte());
        buf.put_u8(0x00);

        let mut count = 0;
        for key in keys {
            let name: &str = key.as_ref();
            let Some(code) = keymap::scancode(name) else {
                trace!("dropping unknown key {name:?}");
                continue;
            };
            if count == MAX_KEYS {
                trace!("dropping {name}: report already holds {MAX_KEYS} keys");
                break;
            }
            buf.put_u8(code);
            count += 1;
        }

        Self { bytes: buf.freeze() }
    }

    /// The all-keys-up report, independent of modifier state.
    pub fn release() -> Self {
        Self {
            bytes: Bytes::from_static(&[HIDP_INPUT_HEADER, KEYBOARD_REPORT_ID, 0x00]),
        }
    }

    /// Raw report bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap clone of the underlying buffer.
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns `true` for the release report.
    pub fn is_release(&self) -> bool {
        self.bytes.len() == 3
    }

    /// Modifier byte carried by this report.
    pub fn modifier_byte(&self) -> u8 {
        self.bytes[2]
    }

    /// Key codes carried by this report (empty for a release).
    pub fn keys(&self) -> &[u8] {
        self.bytes.get(REPORT_PREFIX_LEN..).unwrap_or(&[])
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Report(")?;
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        write!(f, ")")
    }
}

impl AsRef<[u8]> for Report {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

// ── Tests ────────────────────────────────────────────────────────
