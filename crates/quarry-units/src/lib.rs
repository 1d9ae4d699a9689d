//! Analysis units and the default unit finder.
//!
//! Units decode, transform, or extract from a target and hand everything
//! they produce back to the engine, which recurses on it and searches it for
//! flags. The [`UnitRegistry`] is the stock [`quarry_engine::Finder`]: it
//! owns the catalogue of unit constructors and applies the selection policy
//! (`unit`, `exclude`, `default-units`) plus recursion protection.
#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

mod railfence;
mod raw;
mod registry;

pub use railfence::Railfence;
pub use raw::Raw;
pub use registry::UnitRegistry;

/// Printable ASCII plus common whitespace; units that only make sense on
/// text gate their applicability on this.
pub(crate) fn is_printable_text(data: &[u8]) -> bool {
    !data.is_empty()
        && data
            .iter()
            .all(|&b| (0x20..=0x7e).contains(&b) || b == b'\n' || b == b'\r' || b == b'\t')
}

/// The advisory minimum payload size units should consider.
pub(crate) fn min_data(manager: &quarry_engine::Manager) -> usize {
    manager
        .options()
        .get_int(config::MANAGER_SECTION, "min-data")
        .map(|n| n.max(0) as usize)
        .unwrap_or(10)
}
