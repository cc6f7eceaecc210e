//! End-to-end scenarios for the palette bank frame protocol.

use palram::bank::{COLOR_COUNT, COLORS_PER_SLOT, Bpp, PaletteBank, colors_hash};
use palram::color::Rgb15;
use palram::fixed::{Intensity, Level};
use palram::handle::PaletteHandle;
use palram::palettes::{PaletteTarget, Palettes};

fn numbered(base: u8) -> [Rgb15; 16] {
    core::array::from_fn(|i| Rgb15::new(base, i as u8, 0))
}

/// The 8bpp palette and 4bpp palettes share one region from opposite ends,
/// and freeing makes room to regrow.
#[test]
fn bpp8_and_bpp4_share_the_region_from_opposite_ends() {
    let bank = PaletteBank::new();

    let two_banks = [Rgb15::new(1, 1, 1); 32];
    assert_eq!(bank.create_bpp_8(&two_banks), Some(0));
    assert_eq!(bank.colors_count(0), 32);

    let c = numbered(7);
    let id = bank.create_bpp_4(&c, colors_hash(&c)).unwrap();
    assert_eq!(id, 15);

    // Free the 8bpp allocation; three banks now fit below the 4bpp head.
    bank.decrease_usages(0);
    let three_banks = [Rgb15::new(2, 2, 2); 48];
    assert_eq!(bank.create_bpp_8(&three_banks), Some(0));
    assert_eq!(bank.colors_count(0), 48);
    assert_eq!(bank.used_slots_count(), 4);
}

/// Identical 4bpp content resolves to the same slot with a second usage
/// and no extra slot consumed.
#[test]
fn duplicate_content_shares_the_slot() {
    let bank = PaletteBank::new();
    let c1 = numbered(3);
    let hash = colors_hash(&c1);

    let first = bank.create_bpp_4(&c1, hash).unwrap();
    assert_eq!(first, 15);
    assert_eq!(bank.usages(first), 1);

    let found = bank.find_bpp_4(&c1, hash).unwrap();
    assert_eq!(found, first);
    bank.increase_usages(found);
    assert_eq!(bank.usages(first), 2);
    assert_eq!(bank.used_slots_count(), 1);
}

/// A half fade blends every channel to the rounded midpoint.
#[test]
fn half_fade_blends_channels_to_the_midpoint() {
    let bank = PaletteBank::new();
    let colors = numbered(12);
    let id = bank.create_bpp_4(&colors, colors_hash(&colors)).unwrap();
    bank.update();
    bank.reset_commit_data();

    let fade = Rgb15::new(31, 5, 0);
    bank.set_fade(id, fade, Intensity::new(0.5));
    bank.update();

    let commit = bank.retrieve_commit_data().unwrap();
    let base = usize::from(id) * COLORS_PER_SLOT;
    assert_eq!(commit.offset(), base);
    assert_eq!(commit.count(), COLORS_PER_SLOT);

    for (i, (got, src)) in commit.colors().iter().zip(colors.iter()).enumerate() {
        let round_half = |v: u8, f: u8| (v + f + 1) / 2;
        assert_eq!(got.r(), round_half(src.r(), fade.r()), "red of color {}", i);
        assert_eq!(got.g(), round_half(src.g(), fade.g()), "green of color {}", i);
        assert_eq!(got.b(), round_half(src.b(), fade.b()), "blue of color {}", i);
    }
}

/// A failed 8bpp request must not corrupt any resident 4bpp slot.
#[test]
fn overlapping_bpp8_request_fails_cleanly() {
    let bank = PaletteBank::new();
    let mut handles = Vec::new();
    for i in 0..16 {
        let colors = numbered(i);
        handles.push(PaletteHandle::create(&bank, &colors, Bpp::FourBpp));
    }
    assert_eq!(bank.used_slots_count(), 16);

    let big = [Rgb15::WHITE; 16];
    assert_eq!(bank.create_bpp_8(&big), None);

    for (i, handle) in handles.iter().enumerate() {
        assert_eq!(*handle.colors(), numbered(i as u8));
    }
}

/// The commit range reproduces exactly the per-slot-then-global pipeline
/// over each touched slot, and untouched slots keep their committed colors.
#[test]
fn commit_round_trip_reproduces_the_pipeline() {
    let bank = PaletteBank::new();
    let plain = numbered(1);
    let effected = numbered(2);
    let id_plain = bank.create_bpp_4(&plain, colors_hash(&plain)).unwrap();
    let id_effected = bank.create_bpp_4(&effected, colors_hash(&effected)).unwrap();
    bank.update();
    bank.reset_commit_data();
    let committed_plain: Vec<Rgb15> = bank.final_colors()
        [usize::from(id_plain) * 16..usize::from(id_plain) * 16 + 16]
        .to_vec();

    bank.set_inverted(id_effected, true);
    bank.set_grayscale_intensity(id_effected, Intensity::new(0.5));
    bank.update();

    let commit = bank.retrieve_commit_data().unwrap();
    assert_eq!(commit.offset(), usize::from(id_effected) * 16);
    assert_eq!(commit.count(), 16);

    // Reference pipeline: invert then half grayscale, straight off the source.
    for (got, src) in commit.colors().iter().zip(effected.iter()) {
        let inv = Rgb15::new(31 - src.r(), 31 - src.g(), 31 - src.b());
        let luma =
            (u32::from(inv.r()) * 19 + u32::from(inv.g()) * 38 + u32::from(inv.b()) * 7 + 32) >> 6;
        let blend = |c: u8| -> u8 {
            ((u32::from(c) * 16 + luma * 16 + 16) >> 5) as u8
        };
        assert_eq!(*got, Rgb15::new(blend(inv.r()), blend(inv.g()), blend(inv.b())));
    }

    // The untouched slot kept its previously committed values.
    let finals = bank.final_colors();
    let plain_now = &finals[usize::from(id_plain) * 16..usize::from(id_plain) * 16 + 16];
    assert_eq!(plain_now, committed_plain.as_slice());
}

/// Global effects apply once over the touched super-range in pipeline order.
#[test]
fn global_pipeline_applies_over_the_super_range() {
    let bank = PaletteBank::new();
    let colors = [Rgb15::new(10, 20, 30); 16];
    let id = bank.create_bpp_4(&colors, colors_hash(&colors)).unwrap();
    bank.set_global_brightness(Level::new(1.0));
    bank.update();

    let commit = bank.retrieve_commit_data().unwrap();
    assert_eq!(commit.offset(), usize::from(id) * 16);
    assert!(commit.colors().iter().all(|c| *c == Rgb15::WHITE));
}

/// Two banks, one frame loop: the context drives update and commit for
/// both regions independently.
#[test]
fn palettes_context_runs_both_regions() {
    let palettes = Palettes::new();
    let sprite_colors = numbered(4);
    let bg_colors = [Rgb15::new(0, 0, 31); 32];

    let sprite = PaletteHandle::create(&palettes.sprite, &sprite_colors, Bpp::FourBpp);
    let bg = PaletteHandle::create(&palettes.bg, &bg_colors, Bpp::EightBpp);

    palettes.update();
    let mut regions = Vec::new();
    palettes.commit(|target, commit| {
        regions.push((target, commit.offset(), commit.count()));
    });
    assert_eq!(
        regions,
        [
            (PaletteTarget::Sprite, 15 * COLORS_PER_SLOT, COLORS_PER_SLOT),
            (PaletteTarget::Background, 0, 2 * COLORS_PER_SLOT),
        ]
    );

    drop(sprite);
    drop(bg);
    assert_eq!(palettes.sprite.used_slots_count(), 0);
    assert_eq!(palettes.bg.used_slots_count(), 0);
}

/// Capacity invariant: the locked-slot count always equals the union of
/// live spans, and never exceeds the region.
#[test]
fn locked_slots_track_live_spans() {
    let bank = PaletteBank::new();
    assert_eq!(bank.used_slots_count(), 0);

    let eight = [Rgb15::BLACK; 128]; // 8 slots
    bank.create_bpp_8(&eight).unwrap();
    assert_eq!(bank.used_slots_count(), 8);

    let mut ids = Vec::new();
    for i in 0..8 {
        let colors = numbered(i);
        ids.push(bank.create_bpp_4(&colors, colors_hash(&colors)).unwrap());
    }
    assert_eq!(bank.used_slots_count(), 16);
    assert!(COLOR_COUNT >= bank.used_slots_count() * COLORS_PER_SLOT);

    for id in ids {
        bank.decrease_usages(id);
    }
    assert_eq!(bank.used_slots_count(), 8);
    bank.decrease_usages(0);
    assert_eq!(bank.used_slots_count(), 0);
}

/// The H-blank fill path sees the same parameters as the frame pipeline,
/// so a scanline buffer matches what update() produces for the same colors.
#[test]
fn hblank_fill_agrees_with_update() {
    let bank = PaletteBank::new();
    let colors = numbered(11);
    let id = bank.create_bpp_4(&colors, colors_hash(&colors)).unwrap();
    bank.set_inverted(id, true);
    bank.set_global_fade(Rgb15::new(0, 31, 0), Intensity::new(0.25));
    bank.update();

    let mut dest = [Rgb15::BLACK; 16];
    bank.fill_hblank_effect_colors(id, &colors, &mut dest);

    let finals = bank.final_colors();
    let base = usize::from(id) * COLORS_PER_SLOT;
    assert_eq!(dest.as_slice(), &finals[base..base + COLORS_PER_SLOT]);
}
