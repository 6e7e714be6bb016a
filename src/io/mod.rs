pub mod output;
pub mod plot;
pub mod reader;

pub use output::{HistoryRow, NamedValue, ParamRecord, RunDirectory, ValidationRecord};
pub use reader::{expand_patterns, read_curve, read_curve_file, read_curves};
