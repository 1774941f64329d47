pub mod connect;
pub mod copy;
pub mod params;
pub mod row;

pub use connect::connect_client;
pub use params::PgParamStore;
pub use row::{column_names, decode_row};
