pub mod enums;
pub mod envelope;
pub mod models;

pub use enums::*;
pub use envelope::*;
pub use models::*;
