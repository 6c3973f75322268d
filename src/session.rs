//! One connected device: command round trips and workflow state

use log::{debug, error, warn};
use std::marker::PhantomData;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::framer::{read_frame, FramingOptions};
use crate::protocol::{Params, Protocol};
use crate::transport::DeviceTransport;
use crate::types::{DeviceError, ParsedResponse, Result};
use crate::workflow::WorkflowState;

/// A connected reader/writer speaking protocol `P` over transport `T`.
///
/// Owns the transport from connect to disconnect. Every command goes through
/// `&mut self`, so a response cycle always completes before the next command
/// is encoded.
pub struct DeviceSession<P: Protocol, T: DeviceTransport, C: Clock = SystemClock> {
    transport: T,
    clock: C,
    config: SessionConfig,
    framing: FramingOptions,
    state: WorkflowState,
    last_response: Option<ParsedResponse>,
    _protocol: PhantomData<P>,
}

impl<P: Protocol, T: DeviceTransport> DeviceSession<P, T, SystemClock> {
    /// Connect to a device over `transport`
    pub fn new(transport: T, config: SessionConfig) -> Result<Self> {
        Self::with_clock(transport, SystemClock::new(), config)
    }
}

impl<P: Protocol, T: DeviceTransport, C: Clock> DeviceSession<P, T, C> {
    /// Fails with [`DeviceError::Config`] if `config` does not validate
    pub fn with_clock(transport: T, clock: C, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let framing = FramingOptions {
            discipline: P::framing(),
            poll: config.poll.clone(),
            quiescent_polls: config.quiescent_polls,
        };
        debug!("[{}] Connected ({})", config.label, P::NAME);
        Ok(Self {
            transport,
            clock,
            config,
            framing,
            state: WorkflowState::Idle,
            last_response: None,
            _protocol: PhantomData,
        })
    }

    /// Close the transport and hand it back
    pub fn disconnect(mut self) -> Result<T> {
        debug!("[{}] Disconnecting", self.config.label);
        self.transport.close().map_err(DeviceError::transport)?;
        Ok(self.transport)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Most recent parsed response, kept until the next one arrives
    pub fn last_response(&self) -> Option<&ParsedResponse> {
        self.last_response.as_ref()
    }

    pub(crate) fn label(&self) -> &str {
        &self.config.label
    }

    pub(crate) fn transition(&mut self, to: WorkflowState) {
        if self.state != to {
            debug!("[{}] {:?} -> {:?}", self.config.label, self.state, to);
            self.state = to;
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.transport.flush().map_err(|e| {
            error!("[{}] Flush failed: {:?}", self.config.label, e);
            DeviceError::transport(e)
        })
    }

    /// Encode and transmit. Nothing is written if encoding fails.
    fn write_command(&mut self, command: P::Command, params: &Params) -> Result<()> {
        let bytes = P::encode(command, params)?;
        self.flush()?;

        debug!(
            "[{}] Sending {}: {:02X?}",
            self.config.label,
            P::name_of(command),
            bytes
        );
        if let Err(e) = self.transport.write(&bytes) {
            error!("[{}] Write error: {:?}", self.config.label, e);
            if let Err(flush_err) = self.transport.flush() {
                error!("[{}] Flush failed: {:?}", self.config.label, flush_err);
            }
            return Err(DeviceError::transport(e));
        }
        Ok(())
    }

    /// Send a command the device does not answer right away
    pub fn send(&mut self, command: P::Command, params: &Params) -> Result<()> {
        self.write_command(command, params)
    }

    /// Send a command and wait for its reply
    pub fn exec(&mut self, command: P::Command, params: &Params) -> Result<ParsedResponse> {
        let spec = P::spec(command);
        if !spec.reply {
            return Err(DeviceError::invalid(format!(
                "`{}` has no immediate reply",
                spec.name
            )));
        }
        self.write_command(command, params)?;
        self.read_response(command, self.config.command_timeout())
    }

    /// Run a command by name. Returns the reply for commands that have one.
    pub fn exec_named(&mut self, name: &str, params: &Params) -> Result<Option<ParsedResponse>> {
        let command = P::lookup(name)?;
        if P::spec(command).reply {
            self.exec(command, params).map(Some)
        } else {
            self.send(command, params).map(|_| None)
        }
    }

    /// Read and parse one frame for `command`. The transport is flushed
    /// afterwards whatever the outcome.
    pub fn read_response(
        &mut self,
        command: P::Command,
        timeout: Duration,
    ) -> Result<ParsedResponse> {
        let name = P::name_of(command);
        let frame = read_frame(&mut self.transport, &self.clock, &self.framing, timeout, name)?;
        let response = P::parse(&frame, command);
        self.flush()?;

        debug!(
            "[{}] {} -> {} {:?}",
            self.config.label,
            name,
            response.status(),
            response.decoded_text()
        );
        self.last_response = Some(response.clone());
        Ok(response)
    }

    /// Read frames until a terminal status arrives.
    ///
    /// In-progress and unrecognised replies are skipped. The whole wait is
    /// bounded by the medium timeout; a terminal failure becomes
    /// [`DeviceError::MediumFailure`].
    pub fn await_terminal(&mut self, command: P::Command) -> Result<ParsedResponse> {
        let timeout = self.config.medium_timeout();
        let deadline = self.clock.now() + timeout;
        loop {
            let remaining = deadline.saturating_sub(self.clock.now());
            if remaining.is_zero() {
                warn!("[{}] {} gave no terminal status", self.config.label, P::name_of(command));
                self.flush()?;
                return Err(DeviceError::DeviceTimeout {
                    command: P::name_of(command).to_string(),
                    timeout,
                });
            }
            let response = self.read_response(command, remaining)?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }
            if status.is_terminal_failure() {
                warn!("[{}] {} failed: {}", self.config.label, response.command(), status);
                return Err(DeviceError::MediumFailure {
                    command: response.command().to_string(),
                    status,
                });
            }
            debug!("[{}] {} still waiting ({})", self.config.label, response.command(), status);
        }
    }

    /// Send each command in turn, reading replies where the device sends one
    pub fn run_sequence(&mut self, commands: &[P::Command]) -> Result<()> {
        for &command in commands {
            if P::spec(command).reply {
                self.exec(command, &Params::None)?;
            } else {
                self.send(command, &Params::None)?;
            }
        }
        Ok(())
    }

    /// Run `op`, then always turn the indicators off and return to idle
    pub(crate) fn guarded<R>(&mut self, op: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let result = op(self);
        if let Err(e) = &result {
            error!("[{}] {}", self.config.label, e);
            self.transition(WorkflowState::Error);
        }
        if let Err(e) = self.run_sequence(P::idle_sequence()) {
            warn!("[{}] Cleanup failed: {}", self.config.label, e);
        }
        self.transition(WorkflowState::Idle);
        result
    }
}
