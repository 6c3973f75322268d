//! Accumulates transport bytes into one complete response frame

use log::{debug, error, trace};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::PollPolicy;
use crate::protocol::{Frame, FrameDiscipline};
use crate::transport::DeviceTransport;
use crate::types::{DeviceError, Result};

/// Framing settings for one session
#[derive(Debug, Clone, PartialEq)]
pub struct FramingOptions {
    pub discipline: FrameDiscipline,
    pub poll: PollPolicy,
    /// Idle polls that end a quiescence-framed reply
    pub quiescent_polls: u32,
}

/// Check whether `buffer` holds a complete frame, returning its length
fn complete_length(
    discipline: FrameDiscipline,
    buffer: &[u8],
    idle_polls: u32,
    needed: u32,
) -> Option<usize> {
    match discipline {
        FrameDiscipline::LengthPrefixed {
            length_offset,
            overhead,
        } => {
            let expected = *buffer.get(length_offset)? as usize + overhead;
            (buffer.len() >= expected).then_some(expected)
        }
        FrameDiscipline::Quiescence => {
            (!buffer.is_empty() && idle_polls >= needed).then_some(buffer.len())
        }
    }
}

fn flush_quietly<T: DeviceTransport>(transport: &mut T) {
    if let Err(e) = transport.flush() {
        error!("Flush failed: {:?}", e);
    }
}

/// Poll `transport` until one frame is complete or `timeout` elapses.
///
/// Polls are non-blocking; between them the loop sleeps on `clock` for the
/// policy's interval, clamped so the deadline is hit exactly. On timeout or
/// transport error the transport is flushed before the error is returned.
pub fn read_frame<T, C>(
    transport: &mut T,
    clock: &C,
    options: &FramingOptions,
    timeout: Duration,
    command: &str,
) -> Result<Frame>
where
    T: DeviceTransport,
    C: Clock + ?Sized,
{
    let start = clock.now();
    let mut delay = options.poll.initial();
    let mut last_len = 0usize;
    let mut idle_polls = 0u32;

    loop {
        let polled = transport
            .poll_readable(Duration::ZERO)
            .and_then(|readable| {
                if readable {
                    transport.read_available().map(|b| b.to_vec())
                } else {
                    Ok(Vec::new())
                }
            });
        let buffer = match polled {
            Ok(buffer) => buffer,
            Err(e) => {
                error!("Read error waiting for {}: {:?}", command, e);
                flush_quietly(transport);
                return Err(DeviceError::transport(e));
            }
        };

        let grew = buffer.len() > last_len;
        if grew {
            trace!("{}: buffered {} bytes", command, buffer.len());
            last_len = buffer.len();
            idle_polls = 0;
            delay = options.poll.initial();
        } else if last_len > 0 {
            idle_polls += 1;
        }

        if let Some(len) =
            complete_length(options.discipline, &buffer, idle_polls, options.quiescent_polls)
        {
            debug!("Received {} bytes for {}: {:02X?}", len, command, &buffer[..len]);
            return Ok(Frame::new(buffer[..len].to_vec()));
        }

        let elapsed = clock.now().saturating_sub(start);
        if elapsed >= timeout {
            error!("Timed out after {:?} waiting for {}", timeout, command);
            flush_quietly(transport);
            return Err(DeviceError::DeviceTimeout {
                command: command.to_string(),
                timeout,
            });
        }

        clock.sleep(delay.min(timeout - elapsed));
        if !grew {
            delay = options.poll.next(delay);
        }
    }
}
