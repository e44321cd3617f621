pub mod aggregate;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod process;
pub mod summary;

pub use error::SurveyError;
pub use process::{CellValue, HeaderMapping, ParseResult, Row};
