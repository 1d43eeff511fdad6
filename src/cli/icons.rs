//! Status glyphs for command output.

use console::{style, StyledObject};

/// Success checkmark icon (green ✓).
pub fn success() -> StyledObject<&'static str> {
    style("✓").green()
}

/// Warning icon (yellow !).
pub fn warn() -> StyledObject<&'static str> {
    style("!").yellow()
}

/// Error icon (red ✗).
pub fn error() -> StyledObject<&'static str> {
    style("✗").red()
}

/// Dim arrow for secondary info.
pub fn dim_arrow() -> StyledObject<&'static str> {
    style("→").dim()
}

/// Bullet point.
pub fn bullet() -> StyledObject<&'static str> {
    style("•").dim()
}
