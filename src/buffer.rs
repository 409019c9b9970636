//! # Response buffer
//!
//! Fixed capacity buffer which collects modem output for a single exchange, plus the substring search used
//! for detecting success and failure tokens.
//!
//! The buffer length (not a NUL terminator) bounds every search, so embedded zero bytes are treated as
//! regular data.
use crate::adapter::Error;
use crate::transport::Transport;
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use heapless::Vec;

/// Default capacity of a response buffer in bytes
pub const RESPONSE_BUFFER_SIZE: usize = 256;

/// Tokens signaling that the modem rejected a command
const ERROR_TOKENS: [&[u8]; 2] = [b"ERROR", b"FAIL"];

/// Returns the offset of the first occurrence of `needle` in `haystack`
///
/// Returns None if the needle is longer than the haystack or is not contained at all. An empty needle
/// matches at offset zero.
pub fn find_pattern(needle: &[u8], haystack: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }

    let last_start = haystack.len() - needle.len();
    (0..=last_start).find(|&offset| &haystack[offset..offset + needle.len()] == needle)
}

/// Bounded buffer for a single modem response
///
/// N: Capacity in bytes. Bytes exceeding the capacity stay in the transport.
pub struct ResponseBuffer<const N: usize> {
    data: Vec<u8, N>,
}

impl<const N: usize> Default for ResponseBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ResponseBuffer<N> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Collects bytes from the transport until the timeout elapsed or the buffer is full
    ///
    /// Previous content is discarded. Returns the collected bytes, which may be empty.
    pub fn read_line<P: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
        &mut self,
        transport: &mut P,
        timer: &mut T,
        timeout: TimerDurationU32<TIMER_HZ>,
    ) -> Result<&[u8], Error> {
        self.data.clear();
        timer.start(timeout).map_err(|_| Error::TimerError)?;

        loop {
            while !self.is_full() && transport.byte_available()? {
                let byte = transport.read_byte()?;

                // Capacity is checked by loop condition
                let _ = self.data.push(byte);
            }

            if self.is_full() {
                break;
            }

            match timer.wait() {
                Ok(_) => break,
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(_)) => return Err(Error::TimerError),
            }
        }

        Ok(self.data.as_slice())
    }

    /// Returns the offset of the given token
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        find_pattern(needle, &self.data)
    }

    pub fn contains(&self, needle: &[u8]) -> bool {
        self.find(needle).is_some()
    }

    /// Checks the collected response for the expected token and classifies the failure otherwise
    pub fn expect(&self, needle: &[u8]) -> Result<usize, Error> {
        if let Some(offset) = self.find(needle) {
            return Ok(offset);
        }

        if self.data.is_empty() {
            return Err(Error::Timeout);
        }

        if self.has_error_token() {
            return Err(Error::ErrorResponse);
        }

        Err(Error::UnexpectedResponse)
    }

    /// True if the modem rejected the command
    pub fn has_error_token(&self) -> bool {
        ERROR_TOKENS.iter().any(|token| self.contains(token))
    }

    /// Appends a single byte. The buffer is cleared first if full.
    pub fn push(&mut self, byte: u8) {
        if self.is_full() {
            self.data.clear();
        }

        // Capacity ensured above
        let _ = self.data.push(byte);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.is_full()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}
