//! Detection states and the indicator each one shows.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DetectionState {
    /// Not calibrated yet (or the last tare failed).
    #[default]
    Undefined,
    /// Tared, waiting for a cup.
    Initialized,
    CupOnScale,
    /// Weight dropped below the cup reading; waiting to see where it settles.
    DrinkingInProgress,
}

/// RGB color shown for a state, plus whether it blinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub blink: bool,
}

impl Indicator {
    pub const fn solid(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, blink: false }
    }

    /// `#rrggbb`, with a `*` suffix when blinking.
    pub fn code(&self) -> String {
        let suffix = if self.blink { "*" } else { "" };
        format!("#{:02x}{:02x}{:02x}{suffix}", self.r, self.g, self.b)
    }
}

impl DetectionState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Initialized => "awaiting cup",
            Self::CupOnScale => "cup present",
            Self::DrinkingInProgress => "drinking",
        }
    }

    pub const fn indicator(self) -> Indicator {
        match self {
            Self::Undefined => Indicator {
                r: 255,
                g: 0,
                b: 0,
                blink: true,
            },
            Self::Initialized => Indicator::solid(255, 0, 180),
            Self::CupOnScale => Indicator::solid(0, 255, 0),
            Self::DrinkingInProgress => Indicator::solid(255, 165, 0),
        }
    }
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
