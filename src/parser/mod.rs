// Series spec language used by the command line

pub mod lexer;
pub mod series;

pub use series::{parse_series_arg, parse_series_spec};
