//! Scorch decodes the binary telemetry that a compile-time tracer emits for a
//! C/C++ build and turns it into something you can actually query: which
//! headers are expensive, which template instantiations dominate, what a
//! single translation unit spent its time on, and who includes what.
//!
//! The input is a family of versioned little-endian files produced by an
//! external trace exporter:
//!
//! - `.scor` — the main score: session metadata, one record per translation
//!   unit, aggregated per-symbol value tables for the hot compile phases, and
//!   a folder hierarchy tying everything back to paths.
//! - `.scor.gbl` — extension value tables for the remaining phases, read
//!   lazily because most views never need them.
//! - `.scor.tNNNN` — packed per-unit execution timelines, reconstructed into
//!   nested-interval trees on demand.
//! - `.scor.incl` — the pre-aggregated includer graph ("who includes this
//!   header, and how expensively").
//! - `.creq` — structural code requirements per file (macro expansions,
//!   calls, inheritance, fields) with packed source locations.
//!
//! Decoding is split from application: worker threads parse files into
//! immutable chunks, and a [`score::load::Loader`] applies finished chunks on
//! the owning thread, stamped with a load generation so that a slow, stale
//! decode can never clobber a newer one. All lookups return `Option` or an
//! empty path rather than erroring; consumers constantly probe for optional
//! cross-references and a miss is not exceptional.
//!
//! The crate has no UI of its own. The `cli` feature builds two small
//! binaries, `scorch-summary` and `scorch-timeline`, which print the same
//! tables and trees a graphical front-end would render.

#![deny(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

macro_rules! invalid_data_error {
    ($($arg:tt)*) => {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!($($arg)*),
        ))
    };
}

/// Score-file decoding, the in-memory dataset and its query engine, timeline
/// reconstruction, the includer graph, and the load orchestrator.
pub mod score;

/// The companion code-requirements model: structural dependency facts
/// extracted per file, decoded from `.creq` files.
pub mod requirements;
