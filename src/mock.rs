//! Scripted transport for protocol tests

use std::collections::VecDeque;
use std::time::Duration;

use crate::transport::DeviceTransport;

enum Step {
    Bytes(Vec<u8>),
    Quiet,
}

/// Each `poll_readable` call plays the next scripted step: either a chunk of
/// bytes arriving, or a poll where nothing new arrives.
#[derive(Default)]
pub(crate) struct MockTransport {
    steps: VecDeque<Step>,
    buffer: Vec<u8>,
    fail_reads: bool,
    fail_writes: bool,
    pub written: Vec<Vec<u8>>,
    pub flushes: usize,
    pub closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes that arrive on one poll
    pub fn chunk(mut self, bytes: &[u8]) -> Self {
        self.steps.push_back(Step::Bytes(bytes.to_vec()));
        self
    }

    pub fn quiet(mut self, polls: usize) -> Self {
        for _ in 0..polls {
            self.steps.push_back(Step::Quiet);
        }
        self
    }

    /// A reply that arrives at once, followed by the idle polls that end it
    pub fn quiet_frame(self, bytes: &[u8]) -> Self {
        self.chunk(bytes).quiet(2)
    }

    /// Every poll fails
    pub fn failing(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Every write fails
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn is_drained(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes whose first byte is one of `opcodes`
    pub fn writes_starting_with(&self, opcodes: &[u8]) -> usize {
        self.written
            .iter()
            .filter(|w| w.first().is_some_and(|b| opcodes.contains(b)))
            .count()
    }
}

impl DeviceTransport for MockTransport {
    type Error = std::io::Error;

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(std::io::Error::other("write refused"));
        }
        self.written.push(data.to_vec());
        Ok(())
    }

    fn poll_readable(&mut self, _timeout: Duration) -> Result<bool, Self::Error> {
        if self.fail_reads {
            return Err(std::io::Error::other("line dropped"));
        }
        if let Some(Step::Bytes(bytes)) = self.steps.pop_front() {
            self.buffer.extend_from_slice(&bytes);
        }
        Ok(!self.buffer.is_empty())
    }

    fn read_available(&mut self) -> Result<&[u8], Self::Error> {
        Ok(&self.buffer)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.buffer.clear();
        self.flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_twice_leaves_buffer_empty() {
        let mut transport = MockTransport::new().chunk(&[1, 2, 3]);
        assert!(transport.poll_readable(Duration::ZERO).unwrap());

        transport.flush().unwrap();
        assert!(transport.read_available().unwrap().is_empty());
        transport.flush().unwrap();
        assert!(transport.read_available().unwrap().is_empty());
        assert!(!transport.poll_readable(Duration::ZERO).unwrap());
    }
}
