//! Four-digit multiplexed seven-segment display driver
//!
//! Only one digit is lit at a time. Each [`SevenSegmentDisplay::refresh_tick`] blanks
//! every line, drives the segment pattern of the next visible position and enables
//! that position's digit line. Called every millisecond or so, persistence of vision
//! shows all four digits.
//!
//! Wiring matches the anemometer front panel:
//! - 8 segment lines (a-g plus decimal point), active LOW
//! - 4 digit enable lines, most significant first, active HIGH

use thiserror::Error;

/// Number of digit positions.
pub const DIGITS: usize = 4;

/// Largest number the display can show.
pub const MAX_NUMBER: i32 = 9999;

/// Segment line levels per decimal digit, bit `i` = level of segment line `i`.
///
/// Segments are active low, so a cleared bit lights the segment. Line 2 is the
/// decimal point and stays dark.
pub const GLYPHS: [u8; 10] = [
    0b0001_0100, // 0
    0b0111_0111, // 1
    0b0100_1100, // 2
    0b0100_0101, // 3
    0b0010_0111, // 4
    0b1000_0101, // 5
    0b1000_0100, // 6
    0b0101_0111, // 7
    0b0000_0100, // 8
    0b0000_0101, // 9
];

/// Simple error type for display pin operations
#[derive(Error, Debug)]
#[error("display pin error: {0}")]
pub struct DisplayError(pub String);

/// Trait for a single display output line
pub trait SegmentPin {
    fn set_level(&mut self, high: bool) -> Result<(), DisplayError>;
}

/// Output line with no hardware behind it; remembers its level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VirtualPin {
    pub high: bool,
}

impl SegmentPin for VirtualPin {
    fn set_level(&mut self, high: bool) -> Result<(), DisplayError> {
        self.high = high;
        Ok(())
    }
}

pub struct SevenSegmentDisplay<P> {
    digit_pins: [P; DIGITS],
    segment_pins: [P; 8],
    digits: [u8; DIGITS],
    number: i32,
    position: usize,
}

impl<P: SegmentPin> SevenSegmentDisplay<P> {
    /// Take ownership of the lines and blank them.
    pub fn new(digit_pins: [P; DIGITS], segment_pins: [P; 8]) -> Result<Self, DisplayError> {
        let mut display = Self {
            digit_pins,
            segment_pins,
            digits: [0; DIGITS],
            number: 0,
            position: 0,
        };
        display.blank()?;
        Ok(display)
    }

    /// Show `number` from the next refresh on.
    ///
    /// Values outside `0..=9999` are logged and ignored; the previous number stays up.
    pub fn set_number(&mut self, number: i32) -> bool {
        if !(0..=MAX_NUMBER).contains(&number) {
            log::warn!("[Display] Number {number} out of range (0-{MAX_NUMBER}), keeping {}", self.number);
            return false;
        }
        if number == self.number {
            return true;
        }

        self.number = number;
        let mut rest = number;
        for slot in self.digits.iter_mut().rev() {
            *slot = (rest % 10) as u8;
            rest /= 10;
        }
        true
    }

    pub fn number(&self) -> i32 {
        self.number
    }

    /// Decimal digits, most significant first.
    pub fn digits(&self) -> [u8; DIGITS] {
        self.digits
    }

    /// Leading zeros stay dark; the least significant position always shows.
    pub fn is_visible(&self, position: usize) -> bool {
        position == DIGITS - 1 || self.digits[..=position].iter().any(|&d| d != 0)
    }

    /// Light the next visible position. Returns the position driven.
    pub fn refresh_tick(&mut self) -> Result<usize, DisplayError> {
        while !self.is_visible(self.position) {
            self.position = (self.position + 1) % DIGITS;
        }
        let position = self.position;

        self.blank()?;
        let glyph = GLYPHS[usize::from(self.digits[position])];
        for (line, pin) in self.segment_pins.iter_mut().enumerate() {
            pin.set_level(glyph & (1 << line) != 0)?;
        }
        self.digit_pins[position].set_level(true)?;

        self.position = (position + 1) % DIGITS;
        Ok(position)
    }

    /// Turn every segment and digit off.
    pub fn blank(&mut self) -> Result<(), DisplayError> {
        for pin in self.segment_pins.iter_mut() {
            pin.set_level(true)?;
        }
        for pin in self.digit_pins.iter_mut() {
            pin.set_level(false)?;
        }
        Ok(())
    }

    /// Text rendering of the four positions; suppressed digits are spaces.
    pub fn render_ascii(&self) -> String {
        (0..DIGITS)
            .map(|p| {
                if self.is_visible(p) {
                    char::from(b'0' + self.digits[p])
                } else {
                    ' '
                }
            })
            .collect()
    }

    pub fn digit_pins(&self) -> &[P; DIGITS] {
        &self.digit_pins
    }

    pub fn segment_pins(&self) -> &[P; 8] {
        &self.segment_pins
    }
}

impl SevenSegmentDisplay<VirtualPin> {
    /// Display with no hardware attached, for development mode and tests.
    pub fn virtual_display() -> Self {
        Self {
            digit_pins: [VirtualPin::default(); DIGITS],
            segment_pins: [VirtualPin { high: true }; 8],
            digits: [0; DIGITS],
            number: 0,
            position: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_digits(display: &SevenSegmentDisplay<VirtualPin>) -> Vec<usize> {
        display
            .digit_pins()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.high)
            .map(|(i, _)| i)
            .collect()
    }

    fn segment_levels(display: &SevenSegmentDisplay<VirtualPin>) -> u8 {
        display
            .segment_pins()
            .iter()
            .enumerate()
            .fold(0, |acc, (i, p)| acc | (u8::from(p.high) << i))
    }

    #[test]
    fn test_set_number_splits_digits() {
        let mut display = SevenSegmentDisplay::virtual_display();
        assert!(display.set_number(407));
        assert_eq!(display.digits(), [0, 4, 0, 7]);
        assert_eq!(display.render_ascii(), " 407");
    }

    #[test]
    fn test_out_of_range_keeps_previous_number() {
        let mut display = SevenSegmentDisplay::virtual_display();
        display.set_number(12);
        assert!(!display.set_number(10_000));
        assert!(!display.set_number(-1));
        assert_eq!(display.number(), 12);
        assert_eq!(display.digits(), [0, 0, 1, 2]);
    }

    #[test]
    fn test_refresh_skips_leading_zeros() {
        let mut display = SevenSegmentDisplay::virtual_display();
        display.set_number(42);
        let positions: Vec<usize> = (0..4).map(|_| display.refresh_tick().unwrap()).collect();
        assert_eq!(positions, [2, 3, 2, 3]);
    }

    #[test]
    fn test_zero_shows_only_last_digit() {
        let mut display = SevenSegmentDisplay::virtual_display();
        for _ in 0..3 {
            assert_eq!(display.refresh_tick().unwrap(), 3);
        }
        assert_eq!(display.render_ascii(), "   0");
        assert_eq!(segment_levels(&display), GLYPHS[0]);
    }

    #[test]
    fn test_inner_zeros_stay_visible() {
        let mut display = SevenSegmentDisplay::virtual_display();
        display.set_number(1005);
        let positions: Vec<usize> = (0..4).map(|_| display.refresh_tick().unwrap()).collect();
        assert_eq!(positions, [0, 1, 2, 3]);
    }

    #[test]
    fn test_one_digit_enabled_per_tick() {
        let mut display = SevenSegmentDisplay::virtual_display();
        display.set_number(9876);
        for expected in 0..4 {
            display.refresh_tick().unwrap();
            assert_eq!(lit_digits(&display), [expected]);
            let digit = display.digits()[expected];
            assert_eq!(segment_levels(&display), GLYPHS[usize::from(digit)]);
        }
    }

    #[test]
    fn test_blank_turns_everything_off() {
        let mut display = SevenSegmentDisplay::virtual_display();
        display.set_number(8);
        display.refresh_tick().unwrap();
        display.blank().unwrap();
        assert!(lit_digits(&display).is_empty());
        assert_eq!(segment_levels(&display), 0xFF);
    }
}
