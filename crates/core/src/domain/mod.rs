pub mod contract;
pub mod history;
pub mod key;
pub mod report;
