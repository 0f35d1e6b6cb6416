/*
* Human readable batch results, printed with tabled.
*/
pub mod outcome;
pub mod report;

// Reexport
pub use outcome::OutcomeTable;
pub use report::ReportTable;
