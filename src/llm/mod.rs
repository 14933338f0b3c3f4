pub mod client;
pub mod oracle;
pub mod prompts;
pub mod types;

pub use client::*;
pub use oracle::*;
pub use types::*;
