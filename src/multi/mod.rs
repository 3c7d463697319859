// src/multi/mod.rs
mod multi_socket;

#[cfg(feature = "async")]
mod async_socket;

pub use multi_socket::MultiSocket;

#[cfg(feature = "async")]
pub use async_socket::AsyncMultiSocket;
