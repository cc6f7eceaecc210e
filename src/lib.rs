#![no_std]

//! # palram
//!
//! Palette RAM runtime for fixed-hardware console GPUs: a fixed-capacity,
//! content-deduplicating, reference-counted allocator for the two 256-color
//! hardware palette regions (sprite and background), with a deferred
//! color-effect pipeline and a dirty-range commit protocol.
//!
//! The crate owns no hardware: it produces
//! [`PaletteCommit`](bank::PaletteCommit) descriptors that an external
//! DMA/copy routine writes into palette RAM once per frame. Everything else
//! - allocation, dedup, refcounts, effect math, dirty tracking - is pure
//! state, which is also what makes it testable off-target.
//!
//! Start at [`palettes::Palettes`] for the subsystem context,
//! [`handle::PaletteHandle`] for the ownership model, and [`bank`] for the
//! underlying slot machinery and the frame protocol.

pub mod bank;
pub mod color;
pub mod fixed;
pub mod handle;
pub mod palettes;
