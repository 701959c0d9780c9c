pub mod scanner;
pub mod stats;
pub mod storage;
pub mod table;
