pub mod adjustment;
pub mod analysis;
pub mod config;
pub mod error;
pub mod models;
pub mod plate;
pub mod reference;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
