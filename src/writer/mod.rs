// src/writer/mod.rs
mod write_worker;
mod writer_socket;

pub use writer_socket::WriterSocket;
