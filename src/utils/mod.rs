pub mod gate;
pub mod report;
