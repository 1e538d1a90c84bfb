//! Per-pair normalization: price tokens and selection labels.

pub mod label;
pub mod price;

pub use label::{AliasTable, LabelNormalizer};
pub use price::{is_price_token, normalize_price, MAX_MAGNITUDE};
