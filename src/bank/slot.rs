//! Per-slot bookkeeping for one 16-color hardware bank.

use crate::color::Rgb15;
use crate::fixed::Intensity;

/// Palette indexing mode of an allocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Bpp {
    /// 4 bits per pixel: a single 16-color bank.
    #[default]
    FourBpp,
    /// 8 bits per pixel: a multiple of 16 colors, up to the full 256.
    EightBpp,
}

/// Bookkeeping record for one 16-color slot.
///
/// A live allocation owns a contiguous run of slots. Only the head slot
/// carries the span (`slots_count`), the refcount and the effect state;
/// every slot in the run is `locked` so allocation scans skip it.
///
/// `Default` is the free state, and freeing a slot resets it to `Default`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Slot {
    /// Live handle count. 0 = free.
    pub usages: u16,
    /// Number of contiguous slots this allocation spans. Head slots only.
    pub slots_count: u8,
    pub bpp: Bpp,
    /// Content hash, recorded for live `FourBpp` heads (the dedup key).
    pub hash: Option<u32>,
    /// Set for every slot of a live allocation, head or not.
    pub locked: bool,

    // Deferred per-slot effect state, applied by `update()`.
    pub inverted: bool,
    pub grayscale_intensity: Intensity,
    pub fade_color: Rgb15,
    pub fade_intensity: Intensity,
    pub rotate_count: i16,
    /// First slot-relative color index of the rotation window. Never 0:
    /// color 0 is the transparent entry and must not move.
    pub rotate_range_start: u8,
    pub rotate_range_size: u8,
    /// Recompute this slot's final colors on the next `update()`.
    pub update: bool,
}

impl Slot {
    /// Initialize as the head of a fresh allocation.
    pub fn init_head(bpp: Bpp, slots_count: u8, hash: Option<u32>) -> Slot {
        Slot {
            usages: 1,
            slots_count,
            bpp,
            hash,
            locked: true,
            rotate_range_start: 1,
            rotate_range_size: (u16::from(slots_count) * 16 - 1) as u8,
            update: true,
            ..Slot::default()
        }
    }

    /// Initialize as a locked non-head member of a multi-slot allocation.
    pub fn init_tail() -> Slot {
        Slot {
            locked: true,
            ..Slot::default()
        }
    }

    /// Head of a live allocation?
    #[inline(always)]
    pub fn is_live_head(&self) -> bool {
        self.usages > 0
    }

    /// Any per-slot effect differs from the identity?
    pub fn effects_enabled(&self) -> bool {
        self.inverted
            || !self.grayscale_intensity.is_zero()
            || !self.fade_intensity.is_zero()
            || self.rotate_count != 0
    }
}
