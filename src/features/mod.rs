//! Per-property feature engineering over the long HOA table.

pub mod aggregate;
pub mod align;
pub mod encode;
pub mod price;

pub use self::aggregate::add_property_aggregates;
pub use self::align::{align_to_schema, TRAINING_COLUMNS};
pub use self::encode::encode_features;
pub use self::price::{join_median_price, PriceReference};
