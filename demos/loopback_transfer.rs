// demos/loopback_transfer.rs
//! Striped transfer between two ends of a TCP loopback.
//!
//! Run with `cargo run --example loopback_transfer -- "Parallelism=4;BlockSize=65536;"`.

use ebstripe_rs::*;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Instant;

fn main() -> Result<()> {
    let options: StripeOptions = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => StripeOptions::default(),
    };
    println!("MODE {} with {}", TRANSFER_MODE, options);

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let parallelism = options.parallelism;
    let dialer = thread::spawn(move || -> Result<Vec<TcpStream>> {
        let mut stripes = Vec::with_capacity(parallelism);
        for _ in 0..parallelism {
            stripes.push(TcpStream::connect(addr)?);
        }
        Ok(stripes)
    });

    let mut accepted = Vec::with_capacity(options.parallelism);
    for _ in 0..options.parallelism {
        accepted.push(listener.accept()?.0);
    }
    let dialed = dialer.join().map_err(|_| StripeError::WorkerPanicked)??;

    let mut client = MultiSocket::with_options(dialed, &options)?;
    let mut server = MultiSocket::with_options(accepted, &options)?;
    println!("{} stripes from {} to {}", server.stripe_count(), client.local_addr()?, server.local_addr()?);

    let payload: Vec<u8> = (0..32 * 1024 * 1024u32).map(|i| (i % 253) as u8).collect();
    let expected = payload.len();
    let started = Instant::now();

    let sender = thread::spawn(move || -> Result<u64> {
        client.write_all(&payload)?;
        client.finish_and_wait()?;
        let sent = client.bytes_written();
        client.close()?;
        Ok(sent)
    });

    let mut received = Vec::with_capacity(expected);
    server.read_to_end(&mut received)?;
    let sent = sender.join().map_err(|_| StripeError::WorkerPanicked)??;
    server.close()?;

    let elapsed = started.elapsed();
    println!(
        "sent {} bytes, received {} bytes in {:.2?} ({:.1} MiB/s)",
        sent,
        received.len(),
        elapsed,
        received.len() as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64()
    );
    assert_eq!(received.len(), expected);
    Ok(())
}
