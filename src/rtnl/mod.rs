//! Routing-protocol channel: default gateway lookup and default route changes.

pub mod dump;
pub mod route;

pub use dump::{DumpAccumulator, DumpState};
pub use route::{GatewayChange, RouteRecord};

use crate::error::{Error, Result};

use std::ffi::c_int;
use std::net::Ipv4Addr;

/// Datagram transport speaking to the kernel's routing subsystem.
pub trait RouteTransport {
    /// Port id the kernel uses to address replies to this transport.
    fn port_id(&self) -> u32;

    fn send(&mut self, buf: &[u8]) -> std::result::Result<usize, std::io::Error>;

    /// Blocks until one datagram arrives.
    fn recv(&mut self, buf: &mut [u8]) -> std::result::Result<usize, std::io::Error>;
}

#[derive(Debug)]
pub struct RouteSocket {
    socket: c_int,
    port_id: u32,
}

impl RouteSocket {
    pub fn new() -> std::result::Result<Self, std::io::Error> {
        let socket = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW | libc::SOCK_CLOEXEC, libc::NETLINK_ROUTE) };
        if socket < 0 {
            return Err(std::io::Error::last_os_error());
        }
        // from here on Drop closes the descriptor
        let mut this = Self { socket, port_id: 0 };

        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        let addr_len = std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
        let code = unsafe { libc::bind(socket, &addr as *const _ as *const libc::sockaddr, addr_len) };
        if code < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let mut bound: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        let mut bound_len = addr_len;
        let code = unsafe { libc::getsockname(socket, &mut bound as *mut _ as *mut libc::sockaddr, &mut bound_len) };
        if code < 0 {
            return Err(std::io::Error::last_os_error());
        }
        this.port_id = bound.nl_pid;
        log::debug!("routing socket bound to port {}", this.port_id);

        Ok(this)
    }
}

impl RouteTransport for RouteSocket {
    fn port_id(&self) -> u32 {
        self.port_id
    }

    fn send(&mut self, buf: &[u8]) -> std::result::Result<usize, std::io::Error> {
        let code = unsafe { libc::send(self.socket, buf.as_ptr() as *const libc::c_void, buf.len(), 0) };
        if code < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(code as usize)
    }

    fn recv(&mut self, buf: &mut [u8]) -> std::result::Result<usize, std::io::Error> {
        let code = unsafe { libc::recv(self.socket, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if code < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(code as usize)
    }
}

impl Drop for RouteSocket {
    fn drop(&mut self) {
        if self.socket < 0 {
            return;
        }
        unsafe { libc::close(self.socket) };
    }
}

/// Issues requests on a routing transport and collects the answers.
#[derive(Debug)]
pub struct RouteResolver {
    sequence: u32,
    receive_buffer: usize,
}

impl RouteResolver {
    pub fn new(receive_buffer: usize) -> Self {
        Self::with_sequence(rand::random(), receive_buffer)
    }

    pub fn with_sequence(sequence: u32, receive_buffer: usize) -> Self {
        Self { sequence, receive_buffer: receive_buffer.max(4096) }
    }

    fn next_sequence(&mut self) -> u32 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    fn round_trip<T: RouteTransport>(&mut self, transport: &mut T, request: impl FnOnce(u32, u32) -> Vec<u8>) -> Result<DumpAccumulator> {
        let sequence = self.next_sequence();
        let port = transport.port_id();
        let request = request(sequence, port);
        transport.send(&request)?;

        let mut acc = DumpAccumulator::new(sequence, port);
        let mut buf = vec![0u8; self.receive_buffer];
        while !acc.is_complete() {
            let len = transport.recv(&mut buf)?;
            match acc.feed(&buf[..len]) {
                Ok(_) => {}
                // an explicit kernel error is left for the caller to interpret
                Err(_) if acc.errno().is_some() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(acc)
    }

    /// Resolves the default gateway of `if_name`.
    ///
    /// `Ok(None)` means the routing table has no default route through that
    /// interface.
    pub fn default_gateway<T, F>(&mut self, transport: &mut T, if_name: &str, index_to_name: F) -> Result<Option<Ipv4Addr>>
    where
        T: RouteTransport,
        F: Fn(u32) -> Option<String>,
    {
        let acc = self.round_trip(transport, route::dump_request)?;
        let messages = acc.decode()?;
        log::debug!("route dump returned {} messages", messages.len());
        Ok(route::find_default_gateway(&messages, if_name, index_to_name))
    }

    /// Adds or removes the default route via `gateway` out of interface
    /// `if_name` (index `oif`).
    pub fn change_gateway<T: RouteTransport>(&mut self, transport: &mut T, change: GatewayChange, if_name: &str, oif: u32, gateway: Ipv4Addr) -> Result<()> {
        let acc = self.round_trip(transport, |sequence, port| route::gateway_request(change, oif, gateway, sequence, port))?;
        if let Some(errno) = acc.errno() {
            let op = match change {
                GatewayChange::Add => "set default gateway",
                GatewayChange::Delete => "delete default gateway",
            };
            return Err(Error::kernel(op, if_name, std::io::Error::from_raw_os_error(errno)));
        }
        match acc.state() {
            DumpState::Complete => Ok(()),
            state => Err(Error::Protocol(format!("unexpected state after route change: {:?}", state))),
        }
    }
}
