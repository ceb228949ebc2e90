pub mod medication;
pub mod record;

pub use medication::*;
pub use record::*;
