pub mod records;
pub mod tables;
pub mod types;

pub use records::*;
pub use tables::*;
pub use types::*;
