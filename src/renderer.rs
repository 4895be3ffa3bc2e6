//! # Development Mode Rendering
//!
//! ASCII output of the current estimate for running on a desktop without the front
//! panel. The readout box shows exactly what the four-digit display shows, including
//! suppressed leading zeros, followed by the bearing and its compass point.

use crate::WindEstimate;

/// Sixteen-point compass names, clockwise from north.
const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Nearest compass point for a bearing in degrees.
pub fn compass_point(direction: u16) -> &'static str {
    // each sector is 22.5 degrees wide, centred on its point
    let sector = ((u32::from(direction % 360) * 2 + 22) / 45) % 16;
    COMPASS_POINTS[sector as usize]
}

/// Render one status frame.
///
/// `readout` is the display text as produced by
/// [`SevenSegmentDisplay::render_ascii`](crate::display::SevenSegmentDisplay::render_ascii).
pub fn render_ascii(estimate: Option<&WindEstimate>, readout: &str) -> String {
    let mut out = String::new();
    out.push_str("+------+\n");
    out.push_str(&format!("| {readout:>4} |"));
    match estimate {
        Some(estimate) => out.push_str(&format!(
            "  speed {}  from {:03}° ({})\n",
            estimate.speed,
            estimate.direction,
            compass_point(estimate.direction)
        )),
        None => out.push_str("  warming up\n"),
    }
    out.push_str("+------+");
    out
}

/// Print a frame to stdout.
pub fn draw_ascii(estimate: Option<&WindEstimate>, readout: &str) {
    println!("{}", render_ascii(estimate, readout));
}
