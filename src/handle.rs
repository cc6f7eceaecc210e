//! # Shared-Ownership Palette Handles
//!
//! A [`PaletteHandle`] is the unit of palette ownership consumers hold:
//! cloning a handle shares the underlying allocation (one more usage),
//! dropping it releases that share, and dropping the last one frees the
//! slot. Ownership is released on every exit path; there is no way to leak
//! a usage short of `mem::forget`.
//!
//! ```ignore
//! let palettes = Palettes::new();
//! let grass = PaletteHandle::create(&palettes.bg, &GRASS_COLORS, Bpp::FourBpp);
//!
//! // Same content -> same slot, one more usage, no new upload.
//! let grass2 = PaletteHandle::create(&palettes.bg, &GRASS_COLORS, Bpp::FourBpp);
//! assert_eq!(grass.id(), grass2.id());
//! ```
//!
//! The `create` constructors panic when palette RAM is exhausted; use the
//! `_optional` variants where running out is survivable (e.g. decorative
//! effects under memory pressure).

use crate::bank::{self, Bpp, PaletteBank};
use crate::color::Rgb15;
use crate::fixed::Intensity;

use core::cell::Ref;

/// A refcounted share of one palette allocation.
pub struct PaletteHandle<'a> {
    bank: &'a PaletteBank,
    id: u8,
}

impl<'a> PaletteHandle<'a> {
    /// Handle to an already-resident palette with this content, without
    /// allocating. `None` when nothing matches.
    pub fn find(bank: &'a PaletteBank, colors: &[Rgb15], bpp: Bpp) -> Option<PaletteHandle<'a>> {
        let id = match bpp {
            Bpp::FourBpp => bank.find_bpp_4(colors, bank::colors_hash(colors)),
            Bpp::EightBpp => bank.find_bpp_8(colors),
        }?;
        bank.increase_usages(id);
        Some(PaletteHandle { bank, id })
    }

    /// Find-or-allocate. Panics when palette RAM is exhausted.
    pub fn create(bank: &'a PaletteBank, colors: &[Rgb15], bpp: Bpp) -> PaletteHandle<'a> {
        Self::create_optional(bank, colors, bpp).expect("out of palette slots")
    }

    /// Find-or-allocate, `None` when palette RAM is exhausted.
    pub fn create_optional(
        bank: &'a PaletteBank,
        colors: &[Rgb15],
        bpp: Bpp,
    ) -> Option<PaletteHandle<'a>> {
        match bpp {
            Bpp::FourBpp => {
                let hash = bank::colors_hash(colors);
                if let Some(id) = bank.find_bpp_4(colors, hash) {
                    bank.increase_usages(id);
                    return Some(PaletteHandle { bank, id });
                }
                let id = bank.create_bpp_4(colors, hash)?;
                Some(PaletteHandle { bank, id })
            }
            // The singular 8bpp palette has no dedup; create is always the
            // allocate-or-resize path, which grants the caller's share.
            Bpp::EightBpp => {
                let id = bank.create_bpp_8(colors)?;
                Some(PaletteHandle { bank, id })
            }
        }
    }

    /// Allocate without content dedup. Panics when palette RAM is exhausted.
    pub fn create_new(bank: &'a PaletteBank, colors: &[Rgb15], bpp: Bpp) -> PaletteHandle<'a> {
        Self::create_new_optional(bank, colors, bpp).expect("out of palette slots")
    }

    /// Allocate without content dedup, `None` when palette RAM is exhausted.
    ///
    /// Use for palettes that are about to be mutated in place: sharing a
    /// slot with an identical-looking palette would leak the edits to every
    /// other owner.
    pub fn create_new_optional(
        bank: &'a PaletteBank,
        colors: &[Rgb15],
        bpp: Bpp,
    ) -> Option<PaletteHandle<'a>> {
        let id = match bpp {
            Bpp::FourBpp => bank.create_bpp_4(colors, bank::colors_hash(colors))?,
            Bpp::EightBpp => bank.create_bpp_8(colors)?,
        };
        Some(PaletteHandle { bank, id })
    }

    /// Slot id of the underlying allocation.
    #[inline(always)]
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn bpp(&self) -> Bpp {
        self.bank.bpp(self.id)
    }

    pub fn colors_count(&self) -> usize {
        self.bank.colors_count(self.id)
    }

    /// The allocation's source colors.
    pub fn colors(&self) -> Ref<'_, [Rgb15]> {
        self.bank.colors(self.id)
    }

    /// Replace the allocation's source colors.
    ///
    /// Every handle sharing this allocation sees the change.
    pub fn set_colors(&self, colors: &[Rgb15]) {
        self.bank.set_colors(self.id, colors);
    }

    pub fn set_inverted(&self, inverted: bool) {
        self.bank.set_inverted(self.id, inverted);
    }

    pub fn set_grayscale_intensity(&self, intensity: Intensity) {
        self.bank.set_grayscale_intensity(self.id, intensity);
    }

    pub fn set_fade(&self, color: Rgb15, intensity: Intensity) {
        self.bank.set_fade(self.id, color, intensity);
    }

    pub fn set_rotate_count(&self, count: i16) {
        self.bank.set_rotate_count(self.id, count);
    }

    pub fn set_rotate_range(&self, start: u8, size: u8) {
        self.bank.set_rotate_range(self.id, start, size);
    }
}

impl Clone for PaletteHandle<'_> {
    fn clone(&self) -> Self {
        self.bank.increase_usages(self.id);
        PaletteHandle {
            bank: self.bank,
            id: self.id,
        }
    }
}

impl Drop for PaletteHandle<'_> {
    fn drop(&mut self) {
        self.bank.decrease_usages(self.id);
    }
}

impl core::fmt::Debug for PaletteHandle<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PaletteHandle({})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(base: u8) -> [Rgb15; 16] {
        core::array::from_fn(|i| Rgb15::new(base, i as u8, 0))
    }

    #[test]
    fn find_without_resident_content_allocates_nothing() {
        let bank = PaletteBank::new();
        let colors = numbered(1);
        assert!(PaletteHandle::find(&bank, &colors, Bpp::FourBpp).is_none());
        assert_eq!(bank.used_slots_count(), 0);
    }

    #[test]
    fn identical_content_shares_one_slot() {
        let bank = PaletteBank::new();
        let colors = numbered(2);
        let a = PaletteHandle::create(&bank, &colors, Bpp::FourBpp);
        let b = PaletteHandle::create(&bank, &colors, Bpp::FourBpp);
        assert_eq!(a.id(), b.id());
        assert_eq!(bank.usages(a.id()), 2);
        assert_eq!(bank.used_slots_count(), 1);
    }

    #[test]
    fn create_new_bypasses_dedup() {
        let bank = PaletteBank::new();
        let colors = numbered(3);
        let a = PaletteHandle::create(&bank, &colors, Bpp::FourBpp);
        let b = PaletteHandle::create_new(&bank, &colors, Bpp::FourBpp);
        assert_ne!(a.id(), b.id());
        assert_eq!(bank.usages(a.id()), 1);
        assert_eq!(bank.usages(b.id()), 1);
    }

    #[test]
    fn clone_and_drop_balance_usages() {
        let bank = PaletteBank::new();
        let colors = numbered(4);
        let a = PaletteHandle::create(&bank, &colors, Bpp::FourBpp);
        let id = a.id();
        {
            let b = a.clone();
            let c = b.clone();
            assert_eq!(bank.usages(id), 3);
            drop(b);
            assert_eq!(bank.usages(id), 2);
            let _ = c;
        }
        assert_eq!(bank.usages(id), 1);
        drop(a);
        assert_eq!(bank.used_slots_count(), 0);
    }

    #[test]
    fn last_drop_frees_the_slot_for_reuse() {
        let bank = PaletteBank::new();
        let first = numbered(5);
        let second = numbered(6);
        let id = {
            let handle = PaletteHandle::create(&bank, &first, Bpp::FourBpp);
            handle.id()
        };
        let replacement = PaletteHandle::create(&bank, &second, Bpp::FourBpp);
        assert_eq!(replacement.id(), id);
    }

    #[test]
    fn moves_do_not_touch_usages() {
        let bank = PaletteBank::new();
        let colors = numbered(7);
        let a = PaletteHandle::create(&bank, &colors, Bpp::FourBpp);
        let id = a.id();
        let moved = a;
        assert_eq!(bank.usages(id), 1);
        drop(moved);
        assert_eq!(bank.used_slots_count(), 0);
    }

    #[test]
    fn create_optional_degrades_gracefully() {
        let bank = PaletteBank::new();
        let mut handles = heapless::Vec::<PaletteHandle<'_>, 16>::new();
        for i in 0..16 {
            let colors = numbered(i);
            handles
                .push(PaletteHandle::create(&bank, &colors, Bpp::FourBpp))
                .ok()
                .unwrap();
        }
        let extra = numbered(31);
        assert!(PaletteHandle::create_optional(&bank, &extra, Bpp::FourBpp).is_none());
        // identical content still resolves through dedup at full capacity
        let shared = PaletteHandle::create_optional(&bank, &numbered(9), Bpp::FourBpp);
        assert!(shared.is_some());
    }

    #[test]
    fn shared_bpp8_resize_keeps_both_handles_valid() {
        let bank = PaletteBank::new();
        let small = [Rgb15::BLACK; 32];
        let large = [Rgb15::WHITE; 64];
        let a = PaletteHandle::create(&bank, &small, Bpp::EightBpp);
        let b = PaletteHandle::create(&bank, &large, Bpp::EightBpp);
        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 0);
        assert_eq!(bank.usages(0), 2);
        assert_eq!(a.colors_count(), 64);
        drop(a);
        assert_eq!(bank.usages(0), 1);
        drop(b);
        assert_eq!(bank.used_slots_count(), 0);
    }
}
