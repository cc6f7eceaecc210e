//! # The Palette Subsystem Context
//!
//! The console has two independent 256-color palette regions, one for
//! sprites and one for backgrounds. [`Palettes`] owns the two
//! [`PaletteBank`]s for the lifetime of the graphics subsystem and runs
//! their shared frame protocol. There is no global state: create one
//! `Palettes` at startup and pass it (or its banks) by reference.
//!
//! ```ignore
//! let palettes = Palettes::new();
//!
//! loop {
//!     // input, game logic, palette edits through handles...
//!
//!     palettes.update();
//!     palettes.commit(|target, commit| {
//!         // external DMA step: copy commit.colors() into the `target`
//!         // hardware color region at commit.offset()
//!     });
//!
//!     // wait for vblank
//! }
//! ```

use crate::bank::{PaletteBank, PaletteCommit};

/// Which hardware color region a commit belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PaletteTarget {
    Sprite,
    Background,
}

/// Owner of the sprite and background palette banks.
pub struct Palettes {
    pub sprite: PaletteBank,
    pub bg: PaletteBank,
}

impl Default for Palettes {
    fn default() -> Self {
        Self::new()
    }
}

impl Palettes {
    pub fn new() -> Palettes {
        Palettes {
            sprite: PaletteBank::new(),
            bg: PaletteBank::new(),
        }
    }

    /// The bank backing one hardware color region.
    pub fn bank(&self, target: PaletteTarget) -> &PaletteBank {
        match target {
            PaletteTarget::Sprite => &self.sprite,
            PaletteTarget::Background => &self.bg,
        }
    }

    /// Recompute both banks' final colors. Once per frame, after logic.
    pub fn update(&self) {
        self.sprite.update();
        self.bg.update();
    }

    /// Hand each bank's pending commit to the hardware copy step, then
    /// clear it. Banks with no changes are skipped.
    pub fn commit(&self, mut copy: impl FnMut(PaletteTarget, &PaletteCommit<'_>)) {
        for target in [PaletteTarget::Sprite, PaletteTarget::Background] {
            let bank = self.bank(target);
            if let Some(commit) = bank.retrieve_commit_data() {
                copy(target, &commit);
            }
            bank.reset_commit_data();
        }
    }
}
