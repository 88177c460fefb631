//! Utilities module - text processing helpers and ordered collections

pub mod ordered_map;
pub mod text_utils;

pub use ordered_map::OrderedMap;
pub use text_utils::TextUtils;
