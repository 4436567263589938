/// Trait for serial communication backends.
/// Implement this trait for different transports (real devices, pseudo-terminals, mocks)
pub trait Transport {
    /// Error type for transport operations
    type Error: std::fmt::Debug;

    /// Write data to the transport.
    ///
    /// Implementations accept the entire buffer or fail; a successful call
    /// returns `data.len()`.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Read data from the transport with a timeout in milliseconds.
    ///
    /// A timeout with nothing pending is not a failure: implementations
    /// return `Ok(0)`. `Err` always means the device itself failed.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error>;
}
