// tests/roundtrip_tests.rs
use ebstripe_rs::*;
use proptest::prelude::*;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn shared(stripes: Vec<MemoryStripe>) -> Vec<Arc<MemoryStripe>> {
    stripes.into_iter().map(Arc::new).collect()
}

// Push `data` through a writer over `stripes` pairs and read it back
fn transfer(data: Vec<u8>, stripes: usize, chunk: usize) -> Vec<u8> {
    let (near, far) = MemoryStripe::pairs(stripes);
    let mut writer = WriterSocket::new(shared(near), chunk).unwrap();
    let mut reader = ReaderSocket::new(shared(far)).unwrap();

    let sender = thread::spawn(move || {
        writer.write(&data).unwrap();
        writer.finish_and_wait().unwrap();
        writer.close().unwrap();
    });

    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    sender.join().unwrap();
    out
}

// Every frame a stripe carried, in wire order
fn drain_frames(stripe: &MemoryStripe) -> Vec<Segment> {
    let mut frames = Vec::new();
    loop {
        let segment = Segment::read_from(&mut StripeIo(stripe), MAX_SEGMENT_SIZE).unwrap();
        let done = segment.is_end_of_data();
        frames.push(segment);
        if done {
            return frames;
        }
    }
}

fn send_frame(stripe: &MemoryStripe, data: &[u8], offset: u64) {
    Segment::new(bytes::Bytes::copy_from_slice(data), offset)
        .write_to(&mut StripeIo(stripe))
        .unwrap();
}

fn send_eod(stripe: &MemoryStripe) {
    Header::end_of_data().write_to(&mut StripeIo(stripe)).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_roundtrip(
        data in proptest::collection::vec(any::<u8>(), 0..3000),
        stripes in prop::sample::select(vec![1usize, 2, 4, 8]),
        chunk in prop::sample::select(vec![1usize, 7, 4096]),
    ) {
        let out = transfer(data.clone(), stripes, chunk);
        prop_assert_eq!(out, data);
    }
}

#[test]
fn test_large_transfer() {
    let data: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(transfer(data.clone(), 8, 4096), data);
}

#[test]
fn test_empty_transfer() {
    assert!(transfer(Vec::new(), 4, 16).is_empty());
}

#[test]
fn test_ten_segments_over_four_stripes() {
    let (near, far) = MemoryStripe::pairs(4);
    let mut writer = WriterSocket::new(shared(near), 1000).unwrap();

    let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
    assert_eq!(writer.write(&data).unwrap(), 10_000);
    writer.close().unwrap();

    let mut offsets = Vec::new();
    let mut end_markers = 0;
    for stripe in &far {
        let frames = drain_frames(stripe);
        // Exactly one end-of-data marker per stripe, and it comes last
        assert!(frames.last().unwrap().is_end_of_data());
        end_markers += frames.iter().filter(|s| s.is_end_of_data()).count();

        let stripe_offsets: Vec<u64> = frames.iter().filter(|s| !s.is_end_of_data()).map(Segment::offset).collect();
        assert!(stripe_offsets.windows(2).all(|w| w[0] < w[1]));

        for segment in frames.iter().filter(|s| !s.is_end_of_data()) {
            let start = segment.offset() as usize;
            assert_eq!(segment.len(), 1000);
            assert_eq!(&segment.data[..], &data[start..start + 1000]);
        }
        offsets.extend(stripe_offsets);
    }

    offsets.sort_unstable();
    assert_eq!(offsets, (0..10).map(|i| i * 1000).collect::<Vec<u64>>());
    assert_eq!(end_markers, 4);
}

#[test]
fn test_single_stripe_is_framed_passthrough() {
    let (near, far) = MemoryStripe::pairs(1);
    let mut writer = WriterSocket::new(shared(near), 1000).unwrap();

    writer.write(&[1u8; 10]).unwrap();
    writer.write(&[2u8; 20]).unwrap();
    writer.write(&[3u8; 5]).unwrap();
    writer.close().unwrap();

    let frames = drain_frames(&far[0]);
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0], Segment::new(vec![1u8; 10].into(), 0));
    assert_eq!(frames[1], Segment::new(vec![2u8; 20].into(), 10));
    assert_eq!(frames[2], Segment::new(vec![3u8; 5].into(), 30));
    assert_eq!(frames[3], Segment::end_of_data());
}

#[test]
fn test_reader_restores_order_of_late_stripes() {
    let (near, far) = MemoryStripe::pairs(3);
    let mut reader = ReaderSocket::new(shared(far)).unwrap();

    // Later offsets arrive first, and stripe 0 carries its own segments backwards
    let sender = thread::spawn(move || {
        send_frame(&near[2], b"ij", 8);
        send_eod(&near[2]);
        thread::sleep(Duration::from_millis(20));
        send_frame(&near[1], b"efgh", 4);
        send_eod(&near[1]);
        thread::sleep(Duration::from_millis(20));
        send_frame(&near[0], b"cd", 2);
        send_frame(&near[0], b"ab", 0);
        send_eod(&near[0]);
        near
    });

    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"abcdefghij");
    assert!(reader.is_finished());
    drop(sender.join().unwrap());
}

/// Stripe that stalls before every read
struct SlowStripe {
    inner: MemoryStripe,
    delay: Duration,
}

impl DataSocket for SlowStripe {
    type Addr = MemoryAddr;

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        thread::sleep(self.delay);
        DataSocket::read(&self.inner, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        DataSocket::write(&self.inner, buf)
    }

    fn close(&self) -> io::Result<()> {
        self.inner.close()
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.inner.set_read_deadline(deadline)
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.inner.set_write_deadline(deadline)
    }

    fn local_addr(&self) -> io::Result<MemoryAddr> {
        self.inner.local_addr()
    }

    fn remote_addr(&self) -> io::Result<MemoryAddr> {
        self.inner.remote_addr()
    }
}

#[test]
fn test_roundtrip_with_delayed_stripes() {
    let (near, far) = MemoryStripe::pairs(4);
    let far: Vec<Arc<SlowStripe>> = far
        .into_iter()
        .enumerate()
        .map(|(i, inner)| {
            let delay = if i % 2 == 0 { Duration::from_millis(2) } else { Duration::ZERO };
            Arc::new(SlowStripe { inner, delay })
        })
        .collect();

    let data: Vec<u8> = (0..20_000u32).map(|i| (i * 7) as u8).collect();
    let expected = data.clone();

    let mut writer = WriterSocket::new(shared(near), 333).unwrap();
    let mut reader = ReaderSocket::new(far).unwrap();
    let sender = thread::spawn(move || {
        writer.write(&data).unwrap();
        writer.close().unwrap();
    });

    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    sender.join().unwrap();
    assert_eq!(out, expected);
}

#[test]
fn test_eof_only_after_every_end_marker() {
    let (near, far) = MemoryStripe::pairs(2);
    let mut reader = ReaderSocket::new(shared(far)).unwrap();

    send_frame(&near[0], b"abc", 0);
    send_eod(&near[0]);
    send_frame(&near[1], b"def", 3);

    let mut buf = [0u8; 16];
    let mut got = Vec::new();
    while got.len() < 6 {
        let n = reader.read(&mut buf).unwrap();
        assert!(n > 0);
        got.extend_from_slice(&buf[..n]);
    }
    assert_eq!(got, b"abcdef");

    // Stripe 1 is still open, so the stream has not ended
    reader.set_deadline(Some(Instant::now() + Duration::from_millis(100)));
    assert!(matches!(reader.read(&mut buf), Err(StripeError::Timeout)));
    assert!(!reader.is_finished());

    send_eod(&near[1]);
    reader.set_deadline(None);
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert!(reader.is_finished());
    assert_eq!(reader.position(), 6);
}

#[test]
fn test_small_read_buffer_keeps_remainder() {
    let (near, far) = MemoryStripe::pairs(1);
    let mut reader = ReaderSocket::new(shared(far)).unwrap();

    send_frame(&near[0], b"", 0);
    send_frame(&near[0], b"0123456789", 0);
    send_eod(&near[0]);

    let mut buf = [0u8; 4];
    assert_eq!(reader.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"0123");
    assert_eq!(reader.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"4567");
    assert_eq!(reader.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"89");
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_malformed_header_aborts_read() {
    let (near, far) = MemoryStripe::pairs(2);
    let mut reader = ReaderSocket::new(shared(far)).unwrap();

    // End-of-data flag with a payload length is not a valid frame
    let mut bogus = Header::end_of_data();
    bogus.byte_count = 5;
    StripeIo(&near[1]).write_all(&bogus.encode()).unwrap();

    let mut buf = [0u8; 8];
    let err = reader.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    assert!(matches!(err, StripeError::OnStripe { stripe: 1, .. }));

    assert!(matches!(reader.read(&mut buf), Err(StripeError::TransferAborted)));
}

#[test]
fn test_segment_size_limit_applies_to_frames() {
    let (near, far) = MemoryStripe::pairs(1);
    let mut reader = ReaderSocket::new(shared(far)).unwrap().with_max_segment_size(8);

    send_frame(&near[0], b"eight ok", 0);
    send_frame(&near[0], b"nine long", 8);

    let mut buf = [0u8; 16];
    assert_eq!(reader.read(&mut buf).unwrap(), 8);
    assert_eq!(&buf[..8], b"eight ok");
    let err = reader.read(&mut buf).unwrap_err();
    assert!(matches!(err, StripeError::OnStripe { .. }));
}

#[test]
fn test_stripe_closed_without_end_marker() {
    let (near, far) = MemoryStripe::pairs(2);
    let mut reader = ReaderSocket::new(shared(far)).unwrap();

    send_frame(&near[0], b"abc", 0);
    send_eod(&near[0]);
    near[1].close().unwrap();

    let mut out = Vec::new();
    let err = reader.read_to_end(&mut out).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
}

#[test]
fn test_write_failure_is_reported() {
    let (near, far) = MemoryStripe::pairs(2);
    drop(far);

    let mut writer = WriterSocket::new(shared(near), 10).unwrap();
    // Each worker takes one segment before its stripe breaks
    let n = writer.write(&[0u8; 1000]).unwrap();
    assert!(n > 0 && n < 1000);
    assert_eq!(writer.bytes_written(), n as u64);

    let err = writer.write(b"more").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert!(matches!(err, StripeError::OnStripe { .. }));

    assert!(matches!(writer.write(b"more"), Err(StripeError::TransferAborted)));
    assert!(writer.close().is_err());
}

#[test]
fn test_write_deadline_returns_short_count() {
    let (near, far) = MemoryStripe::pair_with_capacity(1);
    let mut writer = WriterSocket::new(vec![Arc::new(near)], 1).unwrap();

    // The worker takes the first byte, then blocks on the unread peer
    writer.set_deadline(Some(Instant::now() + Duration::from_millis(100)));
    let n = writer.write(b"0123456789").unwrap();
    assert!(n > 0 && n < 10);
    assert_eq!(writer.bytes_written(), n as u64);

    let drain = thread::spawn(move || drain_frames(&far));
    writer.set_deadline(None);
    assert_eq!(writer.write(&b"0123456789"[n..]).unwrap(), 10 - n);
    writer.finish_and_wait().unwrap();

    let frames = drain.join().unwrap();
    let data: Vec<u8> = frames.iter().flat_map(|f| f.data.iter().copied()).collect();
    let offsets: Vec<u64> = frames.iter().filter(|f| !f.is_end_of_data()).map(Segment::offset).collect();
    assert_eq!(data, b"0123456789");
    assert_eq!(offsets, (0..10).collect::<Vec<u64>>());
}

#[test]
fn test_double_close() {
    let (near, far) = MemoryStripe::pairs(3);
    let mut socket = MultiSocket::new(near, 64).unwrap();
    let mut peer = MultiSocket::new(far, 64).unwrap();

    socket.write_all(b"closing twice").unwrap();
    assert!(socket.close().is_ok());
    assert!(socket.close().is_ok());
    assert!(matches!(socket.write(b"late"), Err(StripeError::Closed)));

    let mut out = Vec::new();
    peer.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"closing twice");
}

#[test]
fn test_double_close_keeps_error_class() {
    let (near, far) = MemoryStripe::pairs(2);
    drop(far);

    let mut socket = MultiSocket::new(near, 4).unwrap();
    let _ = socket.write(&[1u8; 64]);

    let first = socket.close().unwrap_err();
    let second = socket.close().unwrap_err();
    assert_eq!(first.kind(), second.kind());
}

#[test]
fn test_tcp_loopback() {
    const STRIPES: usize = 4;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let connector = thread::spawn(move || {
        (0..STRIPES)
            .map(|_| TcpStream::connect(addr).unwrap())
            .collect::<Vec<_>>()
    });
    let accepted: Vec<TcpStream> = (0..STRIPES).map(|_| listener.accept().unwrap().0).collect();
    let connected = connector.join().unwrap();

    let options = StripeOptions::new(STRIPES, 1500).unwrap();
    let mut client = MultiSocket::with_options(connected, &options).unwrap();
    let mut server = MultiSocket::with_options(accepted, &options).unwrap();
    assert_eq!(server.local_addr().unwrap().ip(), addr.ip());

    let data: Vec<u8> = (0..250_000u32).map(|i| (i % 241) as u8).collect();
    let expected = data.clone();
    let sender = thread::spawn(move || {
        client.write_all(&data).unwrap();
        client.close().unwrap();
        client.bytes_written()
    });

    let mut out = Vec::new();
    server.read_to_end(&mut out).unwrap();
    assert_eq!(sender.join().unwrap(), expected.len() as u64);
    assert_eq!(out, expected);
}
