//! Reassembly of multi-part netlink responses.

use crate::error::{Error, Result};

use netlink_packet_core::NetlinkBuffer;
use netlink_packet_core::NetlinkMessage;
use netlink_packet_core::NetlinkPayload;
use netlink_packet_core::{NLMSG_DONE, NLMSG_ERROR, NLMSG_NOOP, NLMSG_OVERRUN, NLM_F_MULTIPART};
use netlink_packet_route::route::RouteMessage;
use netlink_packet_route::RouteNetlinkMessage;

const NLMSG_ALIGNTO: usize = 4;

fn align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpState {
    /// Request sent, nothing matching received yet.
    Awaiting,
    /// At least one part of the answer received.
    Accumulating,
    /// Terminal marker seen, or a part without the multi-part flag.
    Complete,
    Errored,
}

/// Collects the messages answering one request.
///
/// Only messages carrying the request's sequence number and port id are
/// kept; anything else on the socket is skipped.
#[derive(Debug)]
pub struct DumpAccumulator {
    sequence: u32,
    port: u32,
    state: DumpState,
    frames: Vec<Vec<u8>>,
    error: Option<String>,
    errno: Option<i32>,
}

impl DumpAccumulator {
    pub fn new(sequence: u32, port: u32) -> Self {
        Self {
            sequence,
            port,
            state: DumpState::Awaiting,
            frames: Vec::new(),
            error: None,
            errno: None,
        }
    }

    pub fn state(&self) -> DumpState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == DumpState::Complete
    }

    /// Number of payload messages kept so far.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn fail(&mut self, message: String) -> Error {
        log::debug!("netlink response rejected: {}", message);
        self.state = DumpState::Errored;
        self.error = Some(message.clone());
        Error::Protocol(message)
    }

    /// Consumes one datagram read from the socket.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<DumpState> {
        match self.state {
            DumpState::Complete => return Ok(self.state),
            DumpState::Errored => {
                return Err(Error::Protocol(self.error.clone().unwrap_or_default()));
            }
            DumpState::Awaiting | DumpState::Accumulating => {}
        }

        if chunk.is_empty() {
            return Err(self.fail("empty netlink datagram".to_owned()));
        }

        let mut offset = 0;
        while offset < chunk.len() {
            let buf = match NetlinkBuffer::new_checked(&chunk[offset..]) {
                Ok(buf) => buf,
                Err(e) => return Err(self.fail(format!("malformed netlink message: {}", e))),
            };
            let len = buf.length() as usize;
            if len < 16 || offset + len > chunk.len() {
                return Err(self.fail(format!("netlink message length {} out of bounds", len)));
            }
            let frame = &chunk[offset..offset + len];
            offset += align(len);

            if buf.sequence_number() != self.sequence || buf.port_number() != self.port {
                log::debug!(
                    "ignoring stray netlink message (seq {}, port {}), expecting seq {}, port {}",
                    buf.sequence_number(),
                    buf.port_number(),
                    self.sequence,
                    self.port
                );
                continue;
            }

            match buf.message_type() {
                NLMSG_NOOP => continue,
                NLMSG_DONE => {
                    self.state = DumpState::Complete;
                    return Ok(self.state);
                }
                NLMSG_OVERRUN => {
                    return Err(self.fail("netlink overrun".to_owned()));
                }
                NLMSG_ERROR => {
                    let payload = buf.payload();
                    if payload.len() < 4 {
                        return Err(self.fail("truncated netlink error message".to_owned()));
                    }
                    let code = i32::from_ne_bytes([payload[0], payload[1], payload[2], payload[3]]);
                    if code == 0 {
                        // acknowledgement
                        self.state = DumpState::Complete;
                        return Ok(self.state);
                    }
                    self.errno = Some(-code);
                    let err = std::io::Error::from_raw_os_error(-code);
                    return Err(self.fail(format!("kernel returned error: {}", err)));
                }
                _ => {}
            }

            self.frames.push(frame.to_vec());
            self.state = DumpState::Accumulating;

            if buf.flags() & NLM_F_MULTIPART == 0 {
                self.state = DumpState::Complete;
                return Ok(self.state);
            }
        }

        Ok(self.state)
    }

    /// Positive errno of a kernel error reply that ended the exchange.
    pub fn errno(&self) -> Option<i32> {
        self.errno
    }

    /// Decodes the collected route messages. Only valid once complete.
    pub fn decode(&self) -> Result<Vec<RouteMessage>> {
        match (self.state, &self.error) {
            (DumpState::Complete, _) => {}
            (DumpState::Errored, Some(error)) => return Err(Error::Protocol(error.clone())),
            (state, _) => return Err(Error::Protocol(format!("response incomplete ({:?})", state))),
        }

        let mut routes = Vec::new();
        for frame in &self.frames {
            let message = NetlinkMessage::<RouteNetlinkMessage>::deserialize(frame)
                .map_err(|e| Error::Protocol(format!("cannot decode route message: {}", e)))?;
            match message.payload {
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewRoute(route)) => routes.push(route),
                other => log::debug!("skipping non-route payload: {:?}", other),
            }
        }
        Ok(routes)
    }
}
