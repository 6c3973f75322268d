use std::time::Duration;

/// Trait for reader/writer communication backends.
/// Implement this trait for different transports (serial port, test doubles, etc.)
///
/// The receive side is cumulative: bytes stay in the transport's buffer until
/// [`flush`](DeviceTransport::flush) is called, so the framer can watch the
/// buffer grow across polls.
pub trait DeviceTransport {
    /// Error type for transport operations
    type Error: std::fmt::Debug;

    /// Write all of `data` to the device
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Report whether any received bytes are buffered, waiting at most `timeout`
    fn poll_readable(&mut self, timeout: Duration) -> Result<bool, Self::Error>;

    /// Pull pending bytes into the receive buffer and return everything buffered
    /// since the last flush. Does not consume.
    fn read_available(&mut self) -> Result<&[u8], Self::Error>;

    /// Discard the receive buffer
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Release the underlying device
    fn close(&mut self) -> Result<(), Self::Error>;
}
