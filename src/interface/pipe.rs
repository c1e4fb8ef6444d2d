// In-memory input pipe for the bridged console
//
// The embedder pushes bytes typed into its terminal on one end, the console
// streams drain them on the other. Neither end ever blocks; waiting for data
// is the dispatcher's job.

use parking_lot::Mutex;
use ringbuf::{Consumer, Producer, RingBuffer};
use std::cmp::min;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

pub const CONSOLE_PIPE_SIZE: usize = 64 * 1024;

pub struct InputPipe {
    write_end: Mutex<Producer<u8>>,
    read_end: Mutex<Consumer<u8>>,
    eof: AtomicBool,
    size: usize,
}

impl InputPipe {
    /// # Description
    /// Creates an input pipe able to hold `size` undelivered bytes.
    pub fn new_with_capacity(size: usize) -> InputPipe {
        let rb = RingBuffer::<u8>::new(size);
        let (prod, cons) = rb.split();
        InputPipe {
            write_end: Mutex::new(prod),
            read_end: Mutex::new(cons),
            eof: AtomicBool::new(false),
            size,
        }
    }

    pub fn set_eof(&self) {
        self.eof.store(true, Ordering::SeqCst);
    }

    pub fn is_eof(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Number of bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.read_end.lock().len()
    }

    /// True if a read would not have to wait, used by select
    pub fn check_select_read(&self) -> bool {
        self.available() > 0 || self.is_eof()
    }

    /// ### Description
    ///
    /// Appends host-delivered bytes. Returns how many fit; the remainder is
    /// dropped, the same as a terminal discarding typeahead past its buffer.
    pub fn push(&self, data: &[u8]) -> usize {
        let mut write_end = self.write_end.lock();
        let room = write_end.remaining();
        let accepted = min(room, data.len());
        if accepted < data.len() {
            log::warn!("console input overflow, dropped {} bytes", data.len() - accepted);
        }
        write_end.push_slice(&data[..accepted])
    }

    /// ### Description
    ///
    /// Reads whatever is buffered into `buf`.
    ///
    /// ### Returns
    ///
    /// * `Some(n)` - `n` bytes were read, `Some(0)` meaning end of input
    /// * `None` - nothing buffered yet and the host has not closed the input
    pub fn pop(&self, buf: &mut [u8]) -> Option<usize> {
        let mut read_end = self.read_end.lock();
        let pipe_space = read_end.len();
        if pipe_space == 0 {
            return if self.is_eof() { Some(0) } else { None };
        }
        let bytes_to_read = min(buf.len(), pipe_space);
        Some(read_end.pop_slice(&mut buf[0..bytes_to_read]))
    }
}

impl fmt::Debug for InputPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPipe")
            .field("available", &self.available())
            .field("eof", &self.eof)
            .field("size", &self.size)
            .finish()
    }
}
