// src/reader/mod.rs
mod read_worker;
mod reader_socket;

pub use reader_socket::ReaderSocket;
