mod client;
mod error;

pub use client::{RemoteClient, RemoteEntry, RemoteStore};
pub use error::RemoteError;
