//! The serial byte-stream abstraction.
//!
//! The core driver treats the transport as an opaque duplex byte channel with
//! blocking read — it does not assume a specific serial backend. Anything that is
//! `Read + Write + Send` can back a [`Driver`](crate::driver::Driver).
//!
//! **Read contract.** Mirroring the teacher's VMIN=0/VTIME=1 termios configuration
//! in `modem.rs`, a `read()` that returns `Ok(0)` means "no data arrived before the
//! transport's idle timeout," not "connection closed" — the reader loop treats it as
//! a cue to re-check the shutdown flag and try again, never as end-of-stream. A
//! genuinely lost connection must surface as an `Err`.

use std::io::{self, Read, Write};

/// A duplex byte-stream connected to the device.
pub trait SerialPort: io::Read + io::Write + Send {
    /// Discard any bytes currently buffered on the input side. Called once by
    /// `Driver::open` before the handshake, per the spec's requirement that the
    /// host drain pre-existing input before opening. Transports that can't discard
    /// input (e.g. an in-memory loopback) can no-op.
    fn flush_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Accumulates bytes from a `SerialPort` into `\n`-delimited lines. Keeps its own
/// buffer rather than wrapping `std::io::BufReader`, since `BufReader::read_line`
/// treats any zero-byte read as permanent EOF — which would misinterpret an idle
/// timeout as the transport closing.
pub struct LineReader<T: SerialPort> {
    port: T,
    buf: Vec<u8>,
    scratch: [u8; 1024],
}

impl<T: SerialPort> LineReader<T> {
    pub fn new(port: T) -> Self {
        Self {
            port,
            buf: Vec::new(),
            scratch: [0u8; 1024],
        }
    }

    /// Try to produce one complete line (including the trailing `\n`) from
    /// already-buffered bytes, issuing at most one `read` call if none is
    /// buffered yet. Returns `Ok(None)` when the read was idle (no new bytes, no
    /// complete line) — the caller should check the shutdown flag and call again.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.take_buffered_line() {
            return Ok(Some(line));
        }

        let n = self.port.read(&mut self.scratch)?;
        if n > 0 {
            self.buf.extend_from_slice(&self.scratch[..n]);
        }

        Ok(self.take_buffered_line())
    }

    fn take_buffered_line(&mut self) -> Option<String> {
        let newline_pos = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=newline_pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.port
    }
}

/// Write one already-`\n`-terminated frame, then flush — the write mutex in
/// `Engine` ensures frames from different callers are never interleaved mid-line.
pub fn write_frame<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    w.write_all(bytes)?;
    w.flush()
}

/// An in-memory duplex pipe used by tests and by the CLI's `--loopback` mode: bytes
/// written are appended to an internal outbound queue a test can drain, and bytes
/// fed in via [`LoopbackPort::push_inbound`] are what subsequent reads return.
#[cfg(any(test, feature = "loopback"))]
pub mod loopback {
    use super::SerialPort;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct LoopbackPort {
        inbound: Arc<Mutex<VecDeque<u8>>>,
        outbound: Arc<Mutex<Vec<u8>>>,
    }

    impl LoopbackPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Feed bytes that the next reads will return.
        pub fn push_inbound(&self, bytes: &[u8]) {
            self.inbound.lock().unwrap().extend(bytes.iter().copied());
        }

        /// Every byte written so far.
        pub fn written(&self) -> Vec<u8> {
            self.outbound.lock().unwrap().clone()
        }
    }

    impl Read for LoopbackPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut inbound = self.inbound.lock().unwrap();
            let n = buf.len().min(inbound.len());
            if n == 0 {
                // Nothing buffered yet: behave like an idle VTIME timeout rather
                // than busy-spinning the reader thread.
                drop(inbound);
                std::thread::sleep(std::time::Duration::from_millis(5));
                return Ok(0);
            }
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for LoopbackPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialPort for LoopbackPort {}
}
