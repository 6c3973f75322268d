//! Serial port transport for desktop using serialport crate

use crate::config::{Parity, SerialSettings};
use crate::transport::DeviceTransport;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    buffer: Vec<u8>,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate` with 8N1 framing
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        Self::open(&SerialSettings {
            port: port_name.to_string(),
            baud_rate,
            ..SerialSettings::default()
        })
    }

    /// Open a port with explicit line settings
    pub fn open(settings: &SerialSettings) -> Result<Self, serialport::Error> {
        let data_bits = match settings.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let parity = match settings.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        };
        let stop_bits = if settings.stop_bits == 2 {
            serialport::StopBits::Two
        } else {
            serialport::StopBits::One
        };

        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(50))
            .open()?;
        std::thread::sleep(Duration::from_millis(500));
        port.clear(serialport::ClearBuffer::Input)?;

        Ok(Self {
            port,
            buffer: Vec::new(),
        })
    }

    fn pending(&self) -> std::io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(std::io::Error::other)
    }
}

impl DeviceTransport for SerialTransport {
    type Error = std::io::Error;

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn poll_readable(&mut self, timeout: Duration) -> Result<bool, Self::Error> {
        if !self.buffer.is_empty() {
            return Ok(true);
        }

        let start = Instant::now();
        loop {
            if self.pending()? > 0 {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn read_available(&mut self) -> Result<&[u8], Self::Error> {
        let pending = self.pending()?;
        if pending > 0 {
            let mut chunk = vec![0u8; pending];
            let n = self.port.read(&mut chunk)?;
            self.buffer.extend_from_slice(&chunk[..n]);
        }
        Ok(&self.buffer)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.buffer.clear();
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::other)
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.buffer.clear();
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(std::io::Error::other)
    }
}
