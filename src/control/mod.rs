//! Control channel to the kernel's interface configuration facility.
//!
//! Every exchange is a single immutable [`Request`] answered by a single
//! [`Response`]; no request structure is shared between calls.

pub mod ioctl;

pub use ioctl::ControlSocket;

use std::net::Ipv4Addr;

use nix::net::if_::InterfaceFlags;

use crate::hwaddr::MacAddr;

/// Address family of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Inet,
    Inet6,
}

impl Family {
    pub fn from_raw(family: libc::sa_family_t) -> Option<Self> {
        match family as libc::c_int {
            libc::AF_INET => Some(Family::Inet),
            libc::AF_INET6 => Some(Family::Inet6),
            _ => None,
        }
    }
}

/// Which protocol address of an interface a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Local,
    Netmask,
    Broadcast,
}

impl AddressKind {
    pub fn name(&self) -> &'static str {
        match self {
            AddressKind::Local => "address",
            AddressKind::Netmask => "netmask",
            AddressKind::Broadcast => "broadcast",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    GetFlags,
    SetFlags(InterfaceFlags),
    GetAddress(AddressKind),
    SetAddress(AddressKind, Ipv4Addr),
    GetHardwareAddress,
    SetHardwareAddress(MacAddr),
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::GetFlags => "get flags",
            Request::SetFlags(_) => "set flags",
            Request::GetAddress(AddressKind::Local) => "get address",
            Request::GetAddress(AddressKind::Netmask) => "get netmask",
            Request::GetAddress(AddressKind::Broadcast) => "get broadcast",
            Request::SetAddress(AddressKind::Local, _) => "set address",
            Request::SetAddress(AddressKind::Netmask, _) => "set netmask",
            Request::SetAddress(AddressKind::Broadcast, _) => "set broadcast",
            Request::GetHardwareAddress => "get hardware address",
            Request::SetHardwareAddress(_) => "set hardware address",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Flags(InterfaceFlags),
    Address(Ipv4Addr),
    HardwareAddress(MacAddr),
    Applied,
}

/// One entry of a bulk enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerated {
    pub name: String,
    pub family: Option<Family>,
}

pub trait InterfaceControl {
    /// Opens the channel. Calling it again once open is a no-op.
    fn init(&mut self) -> Result<(), std::io::Error>;

    /// Closes the channel. Safe to call when never opened.
    fn clean(&mut self);

    fn is_open(&self) -> bool;

    /// Lists interfaces the kernel reports in one round trip.
    fn enumerate(&mut self) -> Result<Vec<Enumerated>, std::io::Error>;

    /// Issues one request for the named interface.
    fn exchange(&mut self, name: &str, request: Request) -> Result<Response, std::io::Error>;
}
