// src/multi/async_socket.rs
use super::MultiSocket;
use crate::error::{Result, StripeError};
use crate::socket::DataSocket;
use bytes::{Bytes, BytesMut};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task;

enum Command {
    Read {
        max_len: usize,
        response: oneshot::Sender<Result<Bytes>>,
    },
    Write {
        data: Bytes,
        response: oneshot::Sender<Result<()>>,
    },
    Finish {
        response: oneshot::Sender<Result<()>>,
    },
    Close,
}

/// Async handle to a `MultiSocket`.
///
/// The socket lives on a blocking task and runs one command at a time, so a
/// pending `read` delays a following `write` until it completes.
pub struct AsyncMultiSocket {
    command_tx: mpsc::UnboundedSender<Command>,
    handle: Arc<Mutex<Option<task::JoinHandle<Result<()>>>>>,
}

impl AsyncMultiSocket {
    /// Move `socket` onto a blocking task. Must be called inside a Tokio runtime.
    pub fn new<S: DataSocket>(socket: MultiSocket<S>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = task::spawn_blocking(move || Self::socket_task(socket, command_rx));

        AsyncMultiSocket {
            command_tx,
            handle: Arc::new(Mutex::new(Some(handle))),
        }
    }

    fn socket_task<S: DataSocket>(
        mut socket: MultiSocket<S>,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Result<()> {
        while let Some(command) = command_rx.blocking_recv() {
            match command {
                Command::Read { max_len, response } => {
                    let _ = response.send(Self::read_chunk(&mut socket, max_len));
                }
                Command::Write { data, response } => {
                    let result = Self::write_all(&mut socket, &data);
                    let _ = response.send(result);
                }
                Command::Finish { response } => {
                    let _ = response.send(socket.finish_and_wait());
                }
                Command::Close => {
                    return socket.close();
                }
            }
        }

        debug!("async socket handle dropped, closing stripes");
        socket.close()
    }

    fn read_chunk<S: DataSocket>(socket: &mut MultiSocket<S>, max_len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max_len);
        let n = socket.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf.freeze())
    }

    fn write_all<S: DataSocket>(socket: &mut MultiSocket<S>, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = socket.write(data)?;
            data = &data[n..];
        }
        Ok(())
    }

    /// Read up to `max_len` bytes in stream order. An empty result means the
    /// stream has ended.
    pub async fn read(&self, max_len: usize) -> Result<Bytes> {
        if max_len == 0 {
            return Ok(Bytes::new());
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Read {
                max_len,
                response: response_tx,
            })
            .map_err(|_| StripeError::Closed)?;

        response_rx.await.map_err(|_| StripeError::Closed)?
    }

    pub async fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Write {
                data: data.into(),
                response: response_tx,
            })
            .map_err(|_| StripeError::Closed)?;

        response_rx.await.map_err(|_| StripeError::Closed)?
    }

    /// Send end-of-data on every stripe, leaving them open.
    pub async fn finish(&self) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Finish { response: response_tx })
            .map_err(|_| StripeError::Closed)?;

        response_rx.await.map_err(|_| StripeError::Closed)?
    }

    /// Finish the stream, close the stripes and stop the blocking task.
    pub async fn close(&self) -> Result<()> {
        self.command_tx.send(Command::Close).map_err(|_| StripeError::Closed)?;

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.await.map_err(|_| StripeError::WorkerPanicked)??;
        }

        Ok(())
    }
}
