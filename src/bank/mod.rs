//! # Palette Banks
//!
//! A [`PaletteBank`] manages one 256-color hardware palette region as 16
//! slots of 16 colors each. It is three things layered over one fixed array:
//!
//! - an **allocator**: 4bpp palettes take single slots from the top of the
//!   region downward, the single 8bpp palette grows from slot 0 upward, and
//!   the two never overlap;
//! - a **dedup cache**: 4bpp allocations are content-hashed, so loading the
//!   same 16 colors twice shares one slot and one hardware upload;
//! - a **deferred effect pipeline**: invert/grayscale/fade per slot plus
//!   brightness/contrast/intensity/invert/grayscale/fade for the whole bank,
//!   recomputed lazily by [`update()`](PaletteBank::update) and committed as
//!   a minimal dirty range.
//!
//! ## Frame protocol
//!
//! Once per frame, after game logic and before the hardware copy:
//!
//! ```ignore
//! bank.update();
//! if let Some(commit) = bank.retrieve_commit_data() {
//!     // external DMA/copy step: commit.colors() -> palette RAM at commit.offset()
//! }
//! bank.reset_commit_data();
//! ```
//!
//! Source colors live in `initial_colors`; the hardware only ever sees
//! `final_colors`, the post-effect copy. Keeping them separate makes the
//! recompute idempotent: effects never destroy caller-supplied data.

pub(crate) mod effect;
mod slot;

pub use slot::Bpp;
use slot::Slot;

use core::cell::{Ref, RefCell};

use bitflags::bitflags;
use heapless::FnvIndexMap;
use log::{debug, warn};

use crate::color::Rgb15;
use crate::fixed::{Intensity, Level};

/// Number of 16-color slots in one hardware palette region.
pub const SLOT_COUNT: usize = 16;
/// Colors per slot; the indivisible allocation granule.
pub const COLORS_PER_SLOT: usize = 16;
/// Total colors in one hardware palette region.
pub const COLOR_COUNT: usize = SLOT_COUNT * COLORS_PER_SLOT;

/// Content hash for a run of palette colors.
///
/// Deterministic over the run's length plus its first four 32-bit words of
/// packed color data. Cheap and collision-tolerant, not cryptographic: every
/// consumer verifies a hit with an exact content compare.
pub fn colors_hash(colors: &[Rgb15]) -> u32 {
    debug_assert!(colors.len() >= 8);

    let mut hash = colors.len() as u32;
    for pair in colors[..8].chunks_exact(2) {
        let word = u32::from(pair[0].bits()) | (u32::from(pair[1].bits()) << 16);
        hash = hash.rotate_left(5).wrapping_add(word);
    }
    hash
}

bitflags! {
    /// Deferred work owed by the next `update()`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    struct DirtyFlags: u8 {
        /// Something changed since the last `update()`.
        const UPDATE      = 0b0000_0001;
        /// A bank-global effect parameter changed; every live slot must
        /// recompute, even if the parameter went back to neutral.
        const GLOBAL      = 0b0000_0010;
        /// The transparent-color override changed.
        const TRANSPARENT = 0b0000_0100;
    }
}

#[inline]
fn check_bpp4_len(len: usize) {
    assert!(len == COLORS_PER_SLOT, "4bpp palettes are exactly 16 colors");
}

#[inline]
fn check_bpp8_len(len: usize) {
    assert!(
        len >= COLORS_PER_SLOT && len <= COLOR_COUNT && len % COLORS_PER_SLOT == 0,
        "8bpp palettes are a multiple of 16 colors, 16 to 256"
    );
}

/// The slot table and color buffers behind a [`PaletteBank`].
pub(crate) struct BankState {
    slots: [Slot; SLOT_COUNT],
    /// Content hash -> head slot, live 4bpp allocations only. One entry per
    /// hash: a colliding allocation overwrites the mapping, which is why
    /// `find_bpp_4` verifies content and keeps a linear fallback.
    hash_index: FnvIndexMap<u32, u8, SLOT_COUNT>,
    /// Authoritative caller-supplied colors.
    initial_colors: [Rgb15; COLOR_COUNT],
    /// Post-effect colors, the only thing the hardware copy reads.
    final_colors: [Rgb15; COLOR_COUNT],

    // Bank-global effect parameters.
    brightness: Level,
    contrast: Level,
    intensity: Level,
    inverted: bool,
    grayscale_intensity: Intensity,
    fade_color: Rgb15,
    fade_intensity: Intensity,
    /// Override for color 0, the backdrop/transparent entry.
    transparent_color: Option<Rgb15>,

    dirty: DirtyFlags,
    /// Slot range changed since the last `reset_commit_data()`.
    pending_commit: Option<(u8, u8)>,
}

impl BankState {
    fn new() -> BankState {
        BankState {
            slots: core::array::from_fn(|_| Slot::default()),
            hash_index: FnvIndexMap::new(),
            initial_colors: [Rgb15::BLACK; COLOR_COUNT],
            final_colors: [Rgb15::BLACK; COLOR_COUNT],
            brightness: Level::ZERO,
            contrast: Level::ZERO,
            intensity: Level::ZERO,
            inverted: false,
            grayscale_intensity: Intensity::ZERO,
            fade_color: Rgb15::BLACK,
            fade_intensity: Intensity::ZERO,
            transparent_color: None,
            dirty: DirtyFlags::empty(),
            pending_commit: None,
        }
    }

    fn head(&self, id: u8) -> &Slot {
        let slot = &self.slots[usize::from(id)];
        assert!(slot.is_live_head(), "palette id {} is not a live allocation", id);
        slot
    }

    fn head_mut(&mut self, id: u8) -> &mut Slot {
        let slot = &mut self.slots[usize::from(id)];
        assert!(slot.is_live_head(), "palette id {} is not a live allocation", id);
        slot
    }

    fn slot_colors(&self, id: usize) -> &[Rgb15] {
        let span = usize::from(self.slots[id].slots_count) * COLORS_PER_SLOT;
        &self.initial_colors[id * COLORS_PER_SLOT..][..span]
    }

    /// Index of the lowest live 4bpp head; the 8bpp growth cap.
    fn first_bpp4_index(&self) -> usize {
        self.slots
            .iter()
            .position(|slot| slot.is_live_head() && slot.bpp == Bpp::FourBpp)
            .unwrap_or(SLOT_COUNT)
    }

    fn find_bpp_4(&self, colors: &[Rgb15], hash: u32) -> Option<u8> {
        check_bpp4_len(colors.len());

        if let Some(&id) = self.hash_index.get(&hash) {
            let slot = &self.slots[usize::from(id)];
            if slot.is_live_head()
                && slot.bpp == Bpp::FourBpp
                && self.slot_colors(usize::from(id)) == colors
            {
                return Some(id);
            }
            // hash collision or stale entry; fall through to the scan
        }

        // The index holds one slot per hash, so a colliding allocation can
        // shadow an older resident one. Scan the live 4bpp heads directly.
        for id in (0..SLOT_COUNT).rev() {
            let slot = &self.slots[id];
            if slot.is_live_head() && slot.bpp == Bpp::FourBpp && self.slot_colors(id) == colors {
                return Some(id as u8);
            }
        }
        None
    }

    fn find_bpp_8(&self, colors: &[Rgb15]) -> Option<u8> {
        check_bpp8_len(colors.len());

        let required = (colors.len() / COLORS_PER_SLOT) as u8;
        let head = &self.slots[0];
        if head.is_live_head() && head.bpp == Bpp::EightBpp && head.slots_count >= required {
            Some(0)
        } else {
            None
        }
    }

    fn create_bpp_4(&mut self, colors: &[Rgb15], hash: u32) -> Option<u8> {
        check_bpp4_len(colors.len());

        // Top-down keeps 4bpp banks clear of the 8bpp territory at slot 0.
        // Locked covers the 8bpp span, so one flag check bounds the scan.
        let id = (0..SLOT_COUNT).rev().find(|&id| !self.slots[id].locked)?;

        self.slots[id] = Slot::init_head(Bpp::FourBpp, 1, Some(hash));
        self.initial_colors[id * COLORS_PER_SLOT..][..COLORS_PER_SLOT].copy_from_slice(colors);
        if self.hash_index.insert(hash, id as u8).is_err() {
            // index at capacity; the linear fallback in find_bpp_4 still sees us
            warn!(target: "palram", "hash index full, slot {} left unindexed", id);
        }
        self.dirty.insert(DirtyFlags::UPDATE);

        debug!(target: "palram", "created 4bpp palette in slot {}", id);
        Some(id as u8)
    }

    fn create_bpp_8(&mut self, colors: &[Rgb15]) -> Option<u8> {
        check_bpp8_len(colors.len());

        let required = colors.len() / COLORS_PER_SLOT;
        let boundary = self.first_bpp4_index();
        if required > boundary {
            debug!(
                target: "palram",
                "8bpp request for {} slots blocked by 4bpp head at {}", required, boundary
            );
            return None;
        }

        if self.slots[0].is_live_head() {
            // The singular 8bpp allocation resizes in place. A 4bpp head at
            // slot 0 is impossible here: it would have capped `boundary` at 0.
            debug_assert!(self.slots[0].bpp == Bpp::EightBpp);
            let old_span = usize::from(self.slots[0].slots_count);
            for s in required..old_span {
                self.slots[s] = Slot::default();
            }
            for s in old_span..required {
                self.slots[s] = Slot::init_tail();
            }

            let head = &mut self.slots[0];
            head.slots_count = required as u8;
            head.usages += 1;
            head.update = true;
            let colors_count = required * COLORS_PER_SLOT;
            if usize::from(head.rotate_range_start) + usize::from(head.rotate_range_size)
                > colors_count
            {
                head.rotate_range_start = 1;
                head.rotate_range_size = (colors_count - 1) as u8;
            }
            debug!(
                target: "palram",
                "resized 8bpp palette from {} to {} slots", old_span, required
            );
        } else {
            debug_assert!(self.slots[..required].iter().all(|slot| !slot.locked));
            self.slots[0] = Slot::init_head(Bpp::EightBpp, required as u8, None);
            for s in 1..required {
                self.slots[s] = Slot::init_tail();
            }
            debug!(target: "palram", "created 8bpp palette spanning {} slots", required);
        }

        self.initial_colors[..colors.len()].copy_from_slice(colors);
        self.dirty.insert(DirtyFlags::UPDATE);
        Some(0)
    }

    fn increase_usages(&mut self, id: u8) {
        self.head_mut(id).usages += 1;
    }

    fn decrease_usages(&mut self, id: u8) {
        let head = self.head_mut(id);
        head.usages -= 1;
        if head.usages > 0 {
            return;
        }

        let id = usize::from(id);
        let span = usize::from(self.slots[id].slots_count);
        if let Some(hash) = self.slots[id].hash {
            // Drop the index entry only if it still points at us; a
            // colliding allocation may have overwritten it.
            if self.hash_index.get(&hash) == Some(&(id as u8)) {
                self.hash_index.remove(&hash);
            }
        }
        for s in id..id + span {
            self.slots[s] = Slot::default();
        }
        debug!(target: "palram", "freed palette in slot {} ({} slots)", id, span);
    }

    fn set_colors(&mut self, id: u8, colors: &[Rgb15]) {
        let head = self.head(id);
        let span = usize::from(head.slots_count);
        let bpp = head.bpp;
        assert!(
            colors.len() == span * COLORS_PER_SLOT,
            "color count {} does not match the allocation's {} slots",
            colors.len(),
            span
        );

        if bpp == Bpp::FourBpp {
            let old_hash = self.slots[usize::from(id)].hash;
            if let Some(old) = old_hash {
                if self.hash_index.get(&old) == Some(&id) {
                    self.hash_index.remove(&old);
                }
            }
            let hash = colors_hash(colors);
            self.slots[usize::from(id)].hash = Some(hash);
            if self.hash_index.insert(hash, id).is_err() {
                warn!(target: "palram", "hash index full, slot {} left unindexed", id);
            }
        }

        let start = usize::from(id) * COLORS_PER_SLOT;
        self.initial_colors[start..start + colors.len()].copy_from_slice(colors);
        self.slots[usize::from(id)].update = true;
        self.dirty.insert(DirtyFlags::UPDATE);
    }

    fn mark_slot(&mut self, id: u8) {
        self.slots[usize::from(id)].update = true;
        self.dirty.insert(DirtyFlags::UPDATE);
    }

    fn set_inverted(&mut self, id: u8, inverted: bool) {
        let head = self.head_mut(id);
        if head.inverted != inverted {
            head.inverted = inverted;
            self.mark_slot(id);
        }
    }

    fn set_grayscale_intensity(&mut self, id: u8, intensity: Intensity) {
        let head = self.head_mut(id);
        if head.grayscale_intensity != intensity {
            head.grayscale_intensity = intensity;
            self.mark_slot(id);
        }
    }

    fn set_fade(&mut self, id: u8, color: Rgb15, intensity: Intensity) {
        let head = self.head_mut(id);
        // The color check tests the intensity in effect *before* this call:
        // swapping the fade color only matters while a fade is active.
        let mut changed = head.fade_color != color && !head.fade_intensity.is_zero();
        changed |= head.fade_intensity != intensity;
        head.fade_color = color;
        head.fade_intensity = intensity;
        if changed {
            self.mark_slot(id);
        }
    }

    fn set_rotate_count(&mut self, id: u8, count: i16) {
        let head = self.head_mut(id);
        assert!(
            usize::from(count.unsigned_abs()) < usize::from(head.slots_count) * COLORS_PER_SLOT,
            "rotate count {} exceeds the allocation's colors",
            count
        );
        if head.rotate_count != count {
            head.rotate_count = count;
            self.mark_slot(id);
        }
    }

    fn set_rotate_range(&mut self, id: u8, start: u8, size: u8) {
        let head = self.head_mut(id);
        let colors_count = usize::from(head.slots_count) * COLORS_PER_SLOT;
        assert!(start >= 1, "color 0 is the transparent entry and must not rotate");
        assert!(size >= 2, "rotation ranges span at least 2 colors");
        assert!(
            usize::from(start) + usize::from(size) <= colors_count,
            "rotation range ends past the allocation's colors"
        );
        if head.rotate_range_start != start || head.rotate_range_size != size {
            head.rotate_range_start = start;
            head.rotate_range_size = size;
            // only worth a recompute while a rotation is active
            if head.rotate_count != 0 {
                self.mark_slot(id);
            }
        }
    }

    fn set_global_brightness(&mut self, level: Level) {
        if self.brightness != level {
            self.brightness = level;
            self.dirty.insert(DirtyFlags::UPDATE | DirtyFlags::GLOBAL);
        }
    }

    fn set_global_contrast(&mut self, level: Level) {
        if self.contrast != level {
            self.contrast = level;
            self.dirty.insert(DirtyFlags::UPDATE | DirtyFlags::GLOBAL);
        }
    }

    fn set_global_intensity(&mut self, level: Level) {
        if self.intensity != level {
            self.intensity = level;
            self.dirty.insert(DirtyFlags::UPDATE | DirtyFlags::GLOBAL);
        }
    }

    fn set_global_inverted(&mut self, inverted: bool) {
        if self.inverted != inverted {
            self.inverted = inverted;
            self.dirty.insert(DirtyFlags::UPDATE | DirtyFlags::GLOBAL);
        }
    }

    fn set_global_grayscale_intensity(&mut self, intensity: Intensity) {
        if self.grayscale_intensity != intensity {
            self.grayscale_intensity = intensity;
            self.dirty.insert(DirtyFlags::UPDATE | DirtyFlags::GLOBAL);
        }
    }

    fn set_global_fade(&mut self, color: Rgb15, intensity: Intensity) {
        // Same old-intensity guard as the per-slot fade.
        let mut changed = self.fade_color != color && !self.fade_intensity.is_zero();
        changed |= self.fade_intensity != intensity;
        self.fade_color = color;
        self.fade_intensity = intensity;
        if changed {
            self.dirty.insert(DirtyFlags::UPDATE | DirtyFlags::GLOBAL);
        }
    }

    fn set_transparent_color(&mut self, color: Option<Rgb15>) {
        if self.transparent_color != color {
            self.transparent_color = color;
            self.dirty.insert(DirtyFlags::UPDATE | DirtyFlags::TRANSPARENT);
        }
    }

    fn global_effects_enabled(&self) -> bool {
        !self.brightness.is_zero()
            || !self.contrast.is_zero()
            || !self.intensity.is_zero()
            || self.inverted
            || !self.grayscale_intensity.is_zero()
            || !self.fade_intensity.is_zero()
    }

    /// Recopy one slot run from `initial` to `final` and run the per-slot
    /// pipeline: invert -> grayscale -> fade, then the color rotation.
    fn apply_slot_effects(&mut self, id: usize, span: usize) {
        let start = id * COLORS_PER_SLOT;
        let len = span * COLORS_PER_SLOT;
        self.final_colors[start..start + len]
            .copy_from_slice(&self.initial_colors[start..start + len]);

        let slot = self.slots[id].clone();
        let run = &mut self.final_colors[start..start + len];
        if slot.inverted {
            for color in run.iter_mut() {
                *color = effect::invert(*color);
            }
        }
        if !slot.grayscale_intensity.is_zero() {
            for color in run.iter_mut() {
                *color = effect::grayscale(*color, slot.grayscale_intensity);
            }
        }
        if !slot.fade_intensity.is_zero() {
            for color in run.iter_mut() {
                *color = effect::fade(*color, slot.fade_color, slot.fade_intensity);
            }
        }
        if slot.rotate_count != 0 {
            let rs = usize::from(slot.rotate_range_start);
            let size = usize::from(slot.rotate_range_size);
            let window = &mut run[rs..rs + size];
            let count = slot.rotate_count.rem_euclid(size as i16) as usize;
            window.rotate_right(count);
        }
    }

    /// Run the global pipeline over a run of final colors:
    /// brightness -> contrast -> intensity -> invert -> grayscale -> fade.
    fn apply_global_effects(&mut self, start: usize, len: usize) {
        let brightness = self.brightness;
        let contrast = self.contrast;
        let intensity = self.intensity;
        let inverted = self.inverted;
        let grayscale = self.grayscale_intensity;
        let fade_color = self.fade_color;
        let fade_intensity = self.fade_intensity;

        let run = &mut self.final_colors[start..start + len];
        if !brightness.is_zero() {
            for color in run.iter_mut() {
                *color = effect::brightness(*color, brightness);
            }
        }
        if !contrast.is_zero() {
            for color in run.iter_mut() {
                *color = effect::contrast(*color, contrast);
            }
        }
        if !intensity.is_zero() {
            for color in run.iter_mut() {
                *color = effect::intensity(*color, intensity);
            }
        }
        if inverted {
            for color in run.iter_mut() {
                *color = effect::invert(*color);
            }
        }
        if !grayscale.is_zero() {
            for color in run.iter_mut() {
                *color = effect::grayscale(*color, grayscale);
            }
        }
        if !fade_intensity.is_zero() {
            for color in run.iter_mut() {
                *color = effect::fade(*color, fade_color, fade_intensity);
            }
        }
    }

    fn update(&mut self) {
        if !self.dirty.contains(DirtyFlags::UPDATE) {
            return;
        }
        let global_dirty = self.dirty.contains(DirtyFlags::GLOBAL);
        let transparent_dirty = self.dirty.contains(DirtyFlags::TRANSPARENT);
        self.dirty = DirtyFlags::empty();

        let global_active = self.global_effects_enabled();
        let mut first = usize::MAX;
        let mut last = 0;
        let mut touched: u16 = 0;

        let mut id = 0;
        while id < SLOT_COUNT {
            let slot = &self.slots[id];
            if !slot.is_live_head() {
                id += 1;
                continue;
            }
            let span = usize::from(slot.slots_count);
            if slot.update || global_dirty || global_active {
                self.apply_slot_effects(id, span);
                self.slots[id].update = false;
                first = first.min(id);
                last = last.max(id + span - 1);
                for s in id..id + span {
                    touched |= 1 << s;
                }
            }
            id += span;
        }

        // The transparent override lands after the per-slot pass (a live
        // slot 0 recopy would clobber it) and before the global pass (a
        // full-screen fade fades the backdrop too).
        if let Some(transparent) = self.transparent_color {
            if transparent_dirty || touched & 1 != 0 {
                self.final_colors[0] = transparent;
                first = first.min(0);
                last = last.max(0);
                touched |= 1;
            }
        } else if transparent_dirty {
            self.final_colors[0] = self.initial_colors[0];
            first = first.min(0);
            last = last.max(0);
            touched |= 1;
        }

        if first == usize::MAX {
            return;
        }

        if global_active {
            // Free slots inside the touched super-range get a fresh recopy
            // too, so repeating the pass never compounds an effect.
            for s in first..=last {
                if touched & (1 << s) == 0 {
                    let start = s * COLORS_PER_SLOT;
                    self.final_colors[start..start + COLORS_PER_SLOT]
                        .copy_from_slice(&self.initial_colors[start..start + COLORS_PER_SLOT]);
                }
            }
            let start = first * COLORS_PER_SLOT;
            let len = (last - first + 1) * COLORS_PER_SLOT;
            self.apply_global_effects(start, len);
        }

        let range = (first as u8, last as u8);
        self.pending_commit = Some(match self.pending_commit {
            Some((pf, pl)) => (pf.min(range.0), pl.max(range.1)),
            None => range,
        });
        debug!(target: "palram", "palette update touched slots {}..={}", first, last);
    }

    fn commit_span(&self) -> Option<(usize, usize)> {
        let (first, last) = self.pending_commit?;
        let offset = usize::from(first) * COLORS_PER_SLOT;
        let count = (usize::from(last) - usize::from(first) + 1) * COLORS_PER_SLOT;
        Some((offset, count))
    }

    fn reset_commit_data(&mut self) {
        self.pending_commit = None;
    }

    fn fill_hblank_effect_colors(&self, id: u8, source: &[Rgb15], dest: &mut [Rgb15]) {
        assert!(source.len() == dest.len(), "source and dest buffers must match");
        let slot = self.head(id).clone();

        for (src, dst) in source.iter().zip(dest.iter_mut()) {
            let mut color = *src;
            if slot.inverted {
                color = effect::invert(color);
            }
            if !slot.grayscale_intensity.is_zero() {
                color = effect::grayscale(color, slot.grayscale_intensity);
            }
            if !slot.fade_intensity.is_zero() {
                color = effect::fade(color, slot.fade_color, slot.fade_intensity);
            }
            if !self.brightness.is_zero() {
                color = effect::brightness(color, self.brightness);
            }
            if !self.contrast.is_zero() {
                color = effect::contrast(color, self.contrast);
            }
            if !self.intensity.is_zero() {
                color = effect::intensity(color, self.intensity);
            }
            if self.inverted {
                color = effect::invert(color);
            }
            if !self.grayscale_intensity.is_zero() {
                color = effect::grayscale(color, self.grayscale_intensity);
            }
            if !self.fade_intensity.is_zero() {
                color = effect::fade(color, self.fade_color, self.fade_intensity);
            }
            *dst = color;
        }
    }
}

/// Descriptor of the changed run of committed colors.
///
/// Consumed by the external hardware-copy step: write [`colors()`](Self::colors)
/// into the palette region starting [`offset()`](Self::offset) colors in.
pub struct PaletteCommit<'a> {
    colors: Ref<'a, [Rgb15]>,
    offset: usize,
}

impl PaletteCommit<'_> {
    /// Post-effect colors for the changed run.
    pub fn colors(&self) -> &[Rgb15] {
        &self.colors
    }

    /// Offset of the run, in colors, from the start of the palette region.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of colors in the run.
    pub fn count(&self) -> usize {
        self.colors.len()
    }
}

/// One hardware palette region: allocator, dedup cache and effect pipeline.
///
/// The console has two of these (sprite and background); see
/// [`Palettes`](crate::palettes::Palettes). All methods take `&self` so
/// shared-ownership [`PaletteHandle`](crate::handle::PaletteHandle)s can
/// borrow the bank; interior state lives behind a `RefCell` (the bank is
/// single-threaded by construction, mutated only from the main loop).
pub struct PaletteBank {
    state: RefCell<BankState>,
}

impl Default for PaletteBank {
    fn default() -> Self {
        Self::new()
    }
}

impl PaletteBank {
    pub fn new() -> PaletteBank {
        PaletteBank {
            state: RefCell::new(BankState::new()),
        }
    }

    /// Resident 4bpp palette with exactly these 16 colors, if any.
    ///
    /// Pure: never allocates, never touches usage counts.
    pub fn find_bpp_4(&self, colors: &[Rgb15], hash: u32) -> Option<u8> {
        self.state.borrow().find_bpp_4(colors, hash)
    }

    /// Id 0 if the singular 8bpp allocation is live and spans enough slots
    /// for `colors`.
    pub fn find_bpp_8(&self, colors: &[Rgb15]) -> Option<u8> {
        self.state.borrow().find_bpp_8(colors)
    }

    /// Allocate a fresh 4bpp slot for these colors. `None` when all 16
    /// slots are taken.
    pub fn create_bpp_4(&self, colors: &[Rgb15], hash: u32) -> Option<u8> {
        self.state.borrow_mut().create_bpp_4(colors, hash)
    }

    /// Create, or resize in place, the singular 8bpp allocation at id 0.
    ///
    /// `None` when the required span would collide with a live 4bpp slot.
    /// Resizing a live allocation adds one usage for the caller.
    pub fn create_bpp_8(&self, colors: &[Rgb15]) -> Option<u8> {
        self.state.borrow_mut().create_bpp_8(colors)
    }

    pub fn increase_usages(&self, id: u8) {
        self.state.borrow_mut().increase_usages(id);
    }

    /// Drop one usage; the last one frees the allocation, unlocks its slots
    /// and removes its dedup entry.
    pub fn decrease_usages(&self, id: u8) {
        self.state.borrow_mut().decrease_usages(id);
    }

    /// Usage count of a live allocation.
    pub fn usages(&self, id: u8) -> u16 {
        self.state.borrow().head(id).usages
    }

    /// Indexing mode of a live allocation.
    pub fn bpp(&self, id: u8) -> Bpp {
        self.state.borrow().head(id).bpp
    }

    /// Number of colors a live allocation spans.
    pub fn colors_count(&self, id: u8) -> usize {
        usize::from(self.state.borrow().head(id).slots_count) * COLORS_PER_SLOT
    }

    /// The allocation's source colors.
    pub fn colors(&self, id: u8) -> Ref<'_, [Rgb15]> {
        Ref::map(self.state.borrow(), |state| {
            state.head(id);
            state.slot_colors(usize::from(id))
        })
    }

    /// Replace the allocation's source colors and re-register its dedup
    /// entry. The count must match the allocation's span.
    pub fn set_colors(&self, id: u8, colors: &[Rgb15]) {
        self.state.borrow_mut().set_colors(id, colors);
    }

    pub fn inverted(&self, id: u8) -> bool {
        self.state.borrow().head(id).inverted
    }

    pub fn set_inverted(&self, id: u8, inverted: bool) {
        self.state.borrow_mut().set_inverted(id, inverted);
    }

    pub fn grayscale_intensity(&self, id: u8) -> Intensity {
        self.state.borrow().head(id).grayscale_intensity
    }

    pub fn set_grayscale_intensity(&self, id: u8, intensity: Intensity) {
        self.state.borrow_mut().set_grayscale_intensity(id, intensity);
    }

    pub fn fade_color(&self, id: u8) -> Rgb15 {
        self.state.borrow().head(id).fade_color
    }

    pub fn fade_intensity(&self, id: u8) -> Intensity {
        self.state.borrow().head(id).fade_intensity
    }

    pub fn set_fade(&self, id: u8, color: Rgb15, intensity: Intensity) {
        self.state.borrow_mut().set_fade(id, color, intensity);
    }

    pub fn rotate_count(&self, id: u8) -> i16 {
        self.state.borrow().head(id).rotate_count
    }

    /// Right-rotate the allocation's colors by `count` on the next update.
    /// Negative counts rotate left. Magnitude must stay below the
    /// allocation's color count.
    pub fn set_rotate_count(&self, id: u8, count: i16) {
        self.state.borrow_mut().set_rotate_count(id, count);
    }

    pub fn rotate_range(&self, id: u8) -> (u8, u8) {
        let state = self.state.borrow();
        let head = state.head(id);
        (head.rotate_range_start, head.rotate_range_size)
    }

    /// Restrict the rotation window, as slot-relative `start` plus `size`.
    /// `start` is at least 1: color 0 never rotates.
    pub fn set_rotate_range(&self, id: u8, start: u8, size: u8) {
        self.state.borrow_mut().set_rotate_range(id, start, size);
    }

    pub fn global_brightness(&self) -> Level {
        self.state.borrow().brightness
    }

    pub fn set_global_brightness(&self, level: Level) {
        self.state.borrow_mut().set_global_brightness(level);
    }

    pub fn global_contrast(&self) -> Level {
        self.state.borrow().contrast
    }

    pub fn set_global_contrast(&self, level: Level) {
        self.state.borrow_mut().set_global_contrast(level);
    }

    pub fn global_intensity(&self) -> Level {
        self.state.borrow().intensity
    }

    pub fn set_global_intensity(&self, level: Level) {
        self.state.borrow_mut().set_global_intensity(level);
    }

    pub fn global_inverted(&self) -> bool {
        self.state.borrow().inverted
    }

    pub fn set_global_inverted(&self, inverted: bool) {
        self.state.borrow_mut().set_global_inverted(inverted);
    }

    pub fn global_grayscale_intensity(&self) -> Intensity {
        self.state.borrow().grayscale_intensity
    }

    pub fn set_global_grayscale_intensity(&self, intensity: Intensity) {
        self.state.borrow_mut().set_global_grayscale_intensity(intensity);
    }

    pub fn global_fade_color(&self) -> Rgb15 {
        self.state.borrow().fade_color
    }

    pub fn global_fade_intensity(&self) -> Intensity {
        self.state.borrow().fade_intensity
    }

    pub fn set_global_fade(&self, color: Rgb15, intensity: Intensity) {
        self.state.borrow_mut().set_global_fade(color, intensity);
    }

    pub fn transparent_color(&self) -> Option<Rgb15> {
        self.state.borrow().transparent_color
    }

    /// Override color 0, the backdrop/transparent entry, independent of any
    /// allocation. `None` restores the allocation-supplied color.
    pub fn set_transparent_color(&self, color: Option<Rgb15>) {
        self.state.borrow_mut().set_transparent_color(color);
    }

    /// Any bank-global effect parameter away from neutral?
    pub fn global_effects_enabled(&self) -> bool {
        self.state.borrow().global_effects_enabled()
    }

    /// Recompute final colors for everything that changed since the last
    /// call, and extend the pending commit range over it.
    ///
    /// Call once per frame, before the hardware copy. Does nothing when
    /// nothing changed.
    pub fn update(&self) {
        self.state.borrow_mut().update();
    }

    /// The changed run since the last [`reset_commit_data`](Self::reset_commit_data),
    /// or `None` when the hardware copy has nothing to do.
    pub fn retrieve_commit_data(&self) -> Option<PaletteCommit<'_>> {
        let span = self.state.borrow().commit_span()?;
        let (offset, count) = span;
        Some(PaletteCommit {
            colors: Ref::map(self.state.borrow(), |state| {
                &state.final_colors[offset..offset + count]
            }),
            offset,
        })
    }

    /// Forget the pending commit range once the hardware copy consumed it.
    pub fn reset_commit_data(&self) {
        self.state.borrow_mut().reset_commit_data();
    }

    /// The full post-effect color table, as the hardware last saw or will
    /// see it.
    pub fn final_colors(&self) -> Ref<'_, [Rgb15; COLOR_COUNT]> {
        Ref::map(self.state.borrow(), |state| &state.final_colors)
    }

    /// Apply palette `id`'s per-slot pipeline plus the bank-global pipeline
    /// to an externally supplied per-scanline color buffer.
    ///
    /// Rotation is skipped: scanline buffers are single-color streams, not
    /// indexed palettes. Reads only committed effect parameters and writes
    /// only `dest`, so the H-blank interrupt path can call it without extra
    /// synchronization.
    pub fn fill_hblank_effect_colors(&self, id: u8, source: &[Rgb15], dest: &mut [Rgb15]) {
        self.state.borrow().fill_hblank_effect_colors(id, source, dest);
    }

    /// Slots belonging to live allocations.
    pub fn used_slots_count(&self) -> usize {
        self.state.borrow().slots.iter().filter(|slot| slot.locked).count()
    }

    /// Slots free for new allocations.
    pub fn available_slots_count(&self) -> usize {
        SLOT_COUNT - self.used_slots_count()
    }
}
