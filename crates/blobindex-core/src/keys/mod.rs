//! Module: keys
//! Responsibility: the typed row schema — escaping, reversed-time encoding,
//! and one builder/parser per row family.
//! Boundary: everything above (ingest, query, corpus) speaks rows only
//! through this module; nothing here touches the KV.

mod escape;
mod families;
mod revtime;

#[cfg(test)]
mod tests;

pub use escape::{escape, unescape};
pub use families::*;
pub use revtime::{
    RevTimeError, format_rfc3339, parse_rfc3339, reverse_time, reverse_time_str, unreverse_time,
};
