//! Pure calculation functions for geometry and sharpening.
//!
//! All functions here are pure and testable without spawning anything.

use super::params::SharpenPreset;

/// Breakpoints for variable sharpening, smallest first.
///
/// Smaller output images lose proportionally more detail when scaled down,
/// so they get the stronger preset.
const VARIABLE_BREAKPOINTS: &[(u32, SharpenPreset)] = &[
    (50, SharpenPreset::Extreme),
    (100, SharpenPreset::Strong),
    (300, SharpenPreset::Moderate),
    (500, SharpenPreset::Light),
];

/// Pick a sharpening preset from working dimensions.
///
/// Each axis is checked on its own and either one qualifying is enough.
/// A missing axis never matches. Returns `None` when both axes are larger
/// than the last breakpoint, or when neither is known.
///
/// ```
/// # use magick_pipe::command::{variable_preset, SharpenPreset};
/// assert_eq!(variable_preset(Some(250), Some(250)), Some(SharpenPreset::Moderate));
/// assert_eq!(variable_preset(Some(2000), Some(40)), Some(SharpenPreset::Extreme));
/// assert_eq!(variable_preset(None, None), None);
/// ```
pub fn variable_preset(width: Option<u32>, height: Option<u32>) -> Option<SharpenPreset> {
    VARIABLE_BREAKPOINTS
        .iter()
        .find(|(limit, _)| [width, height].into_iter().flatten().any(|v| v <= *limit))
        .map(|(_, preset)| *preset)
}

/// Scale `original` so its width becomes `width`, keeping the aspect ratio.
///
/// The derived height is rounded and never drops below 1px.
pub fn scale_to_width(original: (u32, u32), width: u32) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    let height = (width as f64 * orig_h as f64 / orig_w.max(1) as f64).round() as u32;
    (width, height.max(1))
}

/// Scale `original` so its height becomes `height`, keeping the aspect ratio.
pub fn scale_to_height(original: (u32, u32), height: u32) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    let width = (height as f64 * orig_w as f64 / orig_h.max(1) as f64).round() as u32;
    (width.max(1), height)
}

/// Render a geometry offset with an explicit sign: `+10`, `+0`, `-12`.
pub fn signed_offset(offset: i64) -> String {
    if offset >= 0 {
        format!("+{offset}")
    } else {
        offset.to_string()
    }
}

/// Render a `WxH` size expression where either side may be blank.
pub fn size_expression(width: Option<u32>, height: Option<u32>) -> String {
    let side = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_default();
    format!("{}x{}", side(width), side(height))
}
