//! # imgfit
//!
//! Compress raster images either to a fixed quality or under a byte budget,
//! optionally converting format and pre-scaling dimensions, one file at a
//! time or a whole directory at once.
//!
//! # Architecture: Search, Then Write Once
//!
//! Size mode is a search. Every candidate is encoded in memory and measured;
//! nothing touches the disk until one is accepted:
//!
//! ```text
//! 1. Quality   WebP binary search over quality at full resolution
//! 2. Downscale grayscale, shrink geometrically at minimum quality
//! 3. Last      a fifth of each edge, grayscale, minimum quality
//!    Write     convert to the destination container, atomic rename
//! ```
//!
//! Each tier runs only if the previous one could not fit the budget, so an
//! image is degraded exactly as far as the budget demands.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`fit`] | Size-targeted engine: tolerance window, phases, finalization |
//! | [`compress`] | Quality mode: one re-encode at a fixed quality |
//! | [`batch`] | Directory traversal, parallel jobs, per-file reports |
//! | [`imaging`] | [`Codec`](imaging::Codec) trait, production codec, dimension math |
//! | [`formats`] | Supported containers, name aliases, header probing |
//! | [`scratch`] | Temp files beside the destination, atomic replace |
//! | [`events`] | Progress events sent to the CLI |
//! | [`config`] | `imgfit.toml` loading, validation and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## WebP As The Search Format
//!
//! The search always encodes WebP, whatever the requested container. Its size
//! responds smoothly to quality, which is what a binary search needs, and it
//! is almost always the smallest lossy option. Other containers are reached by
//! a single conversion of the accepted pixels at the end.
//!
//! ## Codec Behind A Trait
//!
//! The engine talks to pixels only through [`imaging::Codec`]. Tests swap in a
//! recording mock with a deterministic size model, so every phase transition
//! can be asserted exactly without encoding real images.
//!
//! ## One Write Per Request
//!
//! Encodes produce byte buffers. The accepted buffer goes to a scratch file in
//! the destination directory and is renamed into place, so the destination is
//! either untouched or complete, and the source may be the destination.

pub mod batch;
pub mod compress;
pub mod config;
pub mod events;
pub mod fit;
pub mod formats;
pub mod imaging;
pub mod output;
pub mod scratch;
