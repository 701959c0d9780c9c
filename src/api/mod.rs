pub mod models;
pub mod scanner;
pub mod stats;

pub use scanner::{QrScanner, ScanUpdate, ScannerError};
