pub mod params;
pub mod row;

pub use params::params_from_values;
pub use row::{column_names, decode_row};
