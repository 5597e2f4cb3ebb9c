//! Native MIDI API identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A concrete backend API a native device can run on.
///
/// The numeric values are stable and match what backends report from their
/// compiled-API query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiApi {
    /// Let the backend pick.
    #[default]
    Unspecified = 0,
    MacOsxCore = 1,
    LinuxAlsa = 2,
    UnixJack = 3,
    WindowsMm = 4,
    /// In-process or no-op API with no system ports behind it.
    Dummy = 5,
}

impl MidiApi {
    pub const ALL: [MidiApi; 6] = [
        MidiApi::Unspecified,
        MidiApi::MacOsxCore,
        MidiApi::LinuxAlsa,
        MidiApi::UnixJack,
        MidiApi::WindowsMm,
        MidiApi::Dummy,
    ];

    /// Map a backend number back to an API. Unknown numbers are `Unspecified`.
    pub fn from_number(number: i32) -> Self {
        match number {
            1 => MidiApi::MacOsxCore,
            2 => MidiApi::LinuxAlsa,
            3 => MidiApi::UnixJack,
            4 => MidiApi::WindowsMm,
            5 => MidiApi::Dummy,
            _ => MidiApi::Unspecified,
        }
    }

    pub fn number(self) -> i32 {
        self as i32
    }

    /// Short identifier, e.g. `"alsa"`.
    pub fn name(self) -> &'static str {
        match self {
            MidiApi::Unspecified => "unspecified",
            MidiApi::MacOsxCore => "core",
            MidiApi::LinuxAlsa => "alsa",
            MidiApi::UnixJack => "jack",
            MidiApi::WindowsMm => "winmm",
            MidiApi::Dummy => "dummy",
        }
    }

    /// Human readable name, e.g. `"Windows MultiMedia"`.
    pub fn display_name(self) -> &'static str {
        match self {
            MidiApi::Unspecified => "Unknown",
            MidiApi::MacOsxCore => "CoreMidi",
            MidiApi::LinuxAlsa => "ALSA",
            MidiApi::UnixJack => "Jack",
            MidiApi::WindowsMm => "Windows MultiMedia",
            MidiApi::Dummy => "Dummy",
        }
    }
}

impl fmt::Display for MidiApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_round_trip() {
        for api in MidiApi::ALL {
            assert_eq!(MidiApi::from_number(api.number()), api);
        }
    }

    #[test]
    fn test_unknown_number_is_unspecified() {
        assert_eq!(MidiApi::from_number(-1), MidiApi::Unspecified);
        assert_eq!(MidiApi::from_number(6), MidiApi::Unspecified);
        assert_eq!(MidiApi::from_number(1000), MidiApi::Unspecified);
    }

    #[test]
    fn test_names() {
        assert_eq!(MidiApi::LinuxAlsa.name(), "alsa");
        assert_eq!(MidiApi::WindowsMm.display_name(), "Windows MultiMedia");
        assert_eq!(MidiApi::MacOsxCore.to_string(), "CoreMidi");
        assert_eq!(MidiApi::default(), MidiApi::Unspecified);
    }
}
