pub mod abundance_matrix;
pub mod cli;
pub mod colormap;
pub mod error;
pub mod generate_test_data;
pub mod plot;
pub mod profile;
pub mod report;
pub mod table_parser;
pub mod taxonomy;

pub use error::{Result, TaxaplotError};
