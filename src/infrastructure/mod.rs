pub mod csv_bar_source;
pub mod mock;
