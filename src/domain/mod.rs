pub mod error;
pub mod matcher;
pub mod model;
pub mod traits;
