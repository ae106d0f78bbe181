pub mod filesystem;
pub mod layout;

pub use layout::{LogFiles, StorageLayout};
