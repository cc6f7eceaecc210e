//! # Color Effect Math
//!
//! Integer-only channel transforms over 5-bit channels (0-31). These are the
//! building blocks `update()` chains into the two fixed pipelines:
//!
//! - per-slot: invert → grayscale → fade
//! - bank-global: brightness → contrast → intensity → invert → grayscale → fade
//!
//! [`Intensity`] parameters carry 5 fractional bits, [`Level`] parameters 8.
//! Blends round to the nearest quantum; range transforms clamp to 0-31.

use crate::color::Rgb15;
use crate::fixed::{Intensity, Level};

#[inline(always)]
fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 31) as u8
}

/// Per-channel complement: `c -> 31 - c`.
#[inline]
pub fn invert(color: Rgb15) -> Rgb15 {
    Rgb15::new(31 - color.r(), 31 - color.g(), 31 - color.b())
}

/// Blend each channel toward the color's luma.
///
/// Luma uses BT.601-flavored weights 19/38/7 (out of 64) so a fully
/// grayscaled white stays 31 on every channel.
#[inline]
pub fn grayscale(color: Rgb15, intensity: Intensity) -> Rgb15 {
    let r = u32::from(color.r());
    let g = u32::from(color.g());
    let b = u32::from(color.b());
    let luma = (r * 19 + g * 38 + b * 7 + 32) >> 6;

    let blend = |c: u32| -> u8 {
        let raw = u32::from(intensity.raw());
        ((c * (32 - raw) + luma * raw + 16) >> 5) as u8
    };
    Rgb15::new(blend(r), blend(g), blend(b))
}

/// Blend each channel toward `fade_color`: `c -> round(c*(1-i) + f*i)`.
#[inline]
pub fn fade(color: Rgb15, fade_color: Rgb15, intensity: Intensity) -> Rgb15 {
    let raw = u32::from(intensity.raw());
    let blend = |c: u8, f: u8| -> u8 {
        ((u32::from(c) * (32 - raw) + u32::from(f) * raw + 16) >> 5) as u8
    };
    Rgb15::new(
        blend(color.r(), fade_color.r()),
        blend(color.g(), fade_color.g()),
        blend(color.b(), fade_color.b()),
    )
}

/// Shift every channel by `level` of full scale: `c -> clamp(c + l*31)`.
#[inline]
pub fn brightness(color: Rgb15, level: Level) -> Rgb15 {
    let delta = (i32::from(level.raw()) * 31 + 128) >> 8;
    Rgb15::new(
        clamp_channel(i32::from(color.r()) + delta),
        clamp_channel(i32::from(color.g()) + delta),
        clamp_channel(i32::from(color.b()) + delta),
    )
}

/// Scale each channel around the midpoint (15.5) by a gain of `1 + level`.
///
/// `level` -1 collapses everything to mid-gray, +1 doubles the distance
/// from the midpoint.
#[inline]
pub fn contrast(color: Rgb15, level: Level) -> Rgb15 {
    let gain = 256 + i32::from(level.raw());
    let apply = |c: u8| -> u8 {
        let centered = 2 * i32::from(c) - 31; // doubled scale keeps the .5 midpoint exact
        clamp_channel((((centered * gain) >> 8) + 31 + 1) >> 1)
    };
    Rgb15::new(apply(color.r()), apply(color.g()), apply(color.b()))
}

/// Scale each channel from black: `c -> clamp(c * (1 + l))`.
#[inline]
pub fn intensity(color: Rgb15, level: Level) -> Rgb15 {
    let raw = i32::from(level.raw());
    let apply = |c: u8| -> u8 {
        let c = i32::from(c);
        clamp_channel(c + ((c * raw + 128) >> 8))
    };
    Rgb15::new(apply(color.r()), apply(color.g()), apply(color.b()))
}
