//! MIDI status bytes and the data-length table.
//!
//! Channel voice constants are the command nibble (upper four bits) with the
//! channel bits cleared; OR in a channel number 0-15 to build a status byte.

use crate::error::{Error, Result};

// System common messages

/// System Exclusive start (0xF0).
pub const SYSEX: u8 = 0xF0;
/// MIDI Time Code Quarter Frame (0xF1).
pub const MIDI_TIME_CODE: u8 = 0xF1;
/// Song Position Pointer (0xF2).
pub const SONG_POSITION_POINTER: u8 = 0xF2;
/// Song Select (0xF3).
pub const SONG_SELECT: u8 = 0xF3;
/// Tune Request (0xF6).
pub const TUNE_REQUEST: u8 = 0xF6;
/// End of System Exclusive (0xF7).
pub const END_OF_EXCLUSIVE: u8 = 0xF7;

// System real-time messages

/// Timing Clock (0xF8).
pub const TIMING_CLOCK: u8 = 0xF8;
/// Start (0xFA).
pub const START: u8 = 0xFA;
/// Continue (0xFB).
pub const CONTINUE: u8 = 0xFB;
/// Stop (0xFC).
pub const STOP: u8 = 0xFC;
/// Active Sensing (0xFE).
pub const ACTIVE_SENSING: u8 = 0xFE;
/// System Reset (0xFF).
pub const SYSTEM_RESET: u8 = 0xFF;

// Channel voice commands

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_PRESSURE: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

/// Number of data bytes (0, 1 or 2) that follow `status` in a short message.
///
/// System common and real-time bytes are matched exactly; anything else is
/// classified by its command nibble. Data bytes (< 0x80) and the SysEx start
/// byte have no fixed length and are rejected.
pub fn data_length_for(status: u8) -> Result<usize> {
    match status {
        TUNE_REQUEST | END_OF_EXCLUSIVE | TIMING_CLOCK | 0xF9 | START | CONTINUE | STOP | 0xFD
        | ACTIVE_SENSING | SYSTEM_RESET => return Ok(0),
        MIDI_TIME_CODE | SONG_SELECT => return Ok(1),
        SONG_POSITION_POINTER => return Ok(2),
        _ => {}
    }

    match status & 0xF0 {
        NOTE_OFF | NOTE_ON | POLY_PRESSURE | CONTROL_CHANGE | PITCH_BEND => Ok(2),
        PROGRAM_CHANGE | CHANNEL_PRESSURE => Ok(1),
        _ => Err(Error::InvalidArgument(format!(
            "invalid status byte: {:#04X}",
            status
        ))),
    }
}

/// True for the system real-time range (0xF8-0xFF), which may interleave
/// with any other message.
#[inline]
pub fn is_realtime(status: u8) -> bool {
    status >= TIMING_CLOCK
}
