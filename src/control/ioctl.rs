
use super::AddressKind;
use super::Enumerated;
use super::Family;
use super::InterfaceControl;
use super::Request;
use super::Response;

use crate::hwaddr::MacAddr;

use nix::net::if_::InterfaceFlags;
use socket2::{Domain, Socket, Type};

use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;

/// Number of entries requested from a bulk enumeration.
pub const ENUMERATE_CAPACITY: usize = 32;

#[repr(C)]
struct IfConf {
    ifc_len: libc::c_int,
    ifc_buf: *mut libc::c_char,
}

/// Kernel control channel: an IPv4 datagram socket used for interface ioctls.
#[derive(Debug, Default)]
pub struct ControlSocket {
    socket: Option<Socket>,
}

impl ControlSocket {
    pub fn new() -> Self {
        Self { socket: None }
    }

    fn raw_fd(&self) -> Result<libc::c_int, std::io::Error> {
        match &self.socket {
            Some(socket) => Ok(socket.as_raw_fd()),
            None => Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "control socket is closed")),
        }
    }

    fn ioctl(&self, request: libc::Ioctl, ifr: &mut libc::ifreq) -> Result<(), std::io::Error> {
        let fd = self.raw_fd()?;
        let code = unsafe { libc::ioctl(fd, request, ifr as *mut libc::ifreq) };
        if code < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn get_flags(&self, name: &str) -> Result<InterfaceFlags, std::io::Error> {
        let mut ifr = new_ifreq(name)?;
        self.ioctl(libc::SIOCGIFFLAGS as libc::Ioctl, &mut ifr)?;
        let flags = unsafe { ifr.ifr_ifru.ifru_flags };
        Ok(InterfaceFlags::from_bits_truncate(flags as u16 as libc::c_int))
    }

    fn set_flags(&self, name: &str, flags: InterfaceFlags) -> Result<(), std::io::Error> {
        let mut ifr = new_ifreq(name)?;
        self.ioctl(libc::SIOCGIFFLAGS as libc::Ioctl, &mut ifr)?;
        ifr.ifr_ifru.ifru_flags = flags.bits() as libc::c_short;
        self.ioctl(libc::SIOCSIFFLAGS as libc::Ioctl, &mut ifr)
    }

    fn get_address(&self, name: &str, kind: AddressKind) -> Result<Ipv4Addr, std::io::Error> {
        let mut ifr = new_ifreq(name)?;
        self.ioctl(get_request(kind), &mut ifr)?;
        let sa = unsafe { address_field(&mut ifr, kind) };
        Ok(read_in_addr(sa))
    }

    fn set_address(&self, name: &str, kind: AddressKind, addr: Ipv4Addr) -> Result<(), std::io::Error> {
        let mut ifr = new_ifreq(name)?;
        // Keep whatever else the kernel filled in; an interface without an
        // address yet answers the read with an error, then the bare request is used.
        if let Err(e) = self.ioctl(get_request(kind), &mut ifr) {
            log::debug!("{}: no current {} ({}), writing fresh request", name, kind.name(), e);
            ifr = new_ifreq(name)?;
        }
        unsafe { write_in_addr(address_field(&mut ifr, kind), addr) };
        self.ioctl(set_request(kind), &mut ifr)
    }

    fn get_hardware_address(&self, name: &str) -> Result<MacAddr, std::io::Error> {
        let mut ifr = new_ifreq(name)?;
        self.ioctl(libc::SIOCGIFHWADDR as libc::Ioctl, &mut ifr)?;
        let data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
        let mut octets = [0u8; 6];
        for (octet, byte) in octets.iter_mut().zip(data.iter()) {
            *octet = *byte as u8;
        }
        Ok(MacAddr(octets))
    }

    fn set_hardware_address(&self, name: &str, mac: MacAddr) -> Result<(), std::io::Error> {
        let mut ifr = new_ifreq(name)?;
        self.ioctl(libc::SIOCGIFHWADDR as libc::Ioctl, &mut ifr)?;
        unsafe {
            for (byte, octet) in ifr.ifr_ifru.ifru_hwaddr.sa_data.iter_mut().zip(mac.octets()) {
                *byte = octet as libc::c_char;
            }
        }
        self.ioctl(libc::SIOCSIFHWADDR as libc::Ioctl, &mut ifr)
    }
}

impl InterfaceControl for ControlSocket {
    fn init(&mut self) -> Result<(), std::io::Error> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
        log::debug!("control socket opened (fd {})", socket.as_raw_fd());
        self.socket = Some(socket);
        Ok(())
    }

    fn clean(&mut self) {
        if self.socket.take().is_some() {
            log::debug!("control socket closed");
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn enumerate(&mut self) -> Result<Vec<Enumerated>, std::io::Error> {
        let fd = self.raw_fd()?;
        let mut reqs: [libc::ifreq; ENUMERATE_CAPACITY] = unsafe { std::mem::zeroed() };
        let mut ifc = IfConf {
            ifc_len: std::mem::size_of_val(&reqs) as libc::c_int,
            ifc_buf: reqs.as_mut_ptr() as *mut libc::c_char,
        };
        let code = unsafe { libc::ioctl(fd, libc::SIOCGIFCONF as libc::Ioctl, &mut ifc as *mut IfConf) };
        if code < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let count = (ifc.ifc_len.max(0) as usize / std::mem::size_of::<libc::ifreq>()).min(ENUMERATE_CAPACITY);
        let entries = reqs[..count]
            .iter()
            .map(|ifr| Enumerated {
                name: ifname_to_string(&ifr.ifr_name),
                family: Family::from_raw(unsafe { ifr.ifr_ifru.ifru_addr.sa_family }),
            })
            .collect::<Vec<_>>();
        log::debug!("enumerated {} interfaces", entries.len());
        Ok(entries)
    }

    fn exchange(&mut self, name: &str, request: Request) -> Result<Response, std::io::Error> {
        log::debug!("{}: {}", name, request.op());
        match request {
            Request::GetFlags => self.get_flags(name).map(Response::Flags),
            Request::SetFlags(flags) => self.set_flags(name, flags).map(|_| Response::Applied),
            Request::GetAddress(kind) => self.get_address(name, kind).map(Response::Address),
            Request::SetAddress(kind, addr) => self.set_address(name, kind, addr).map(|_| Response::Applied),
            Request::GetHardwareAddress => self.get_hardware_address(name).map(Response::HardwareAddress),
            Request::SetHardwareAddress(mac) => self.set_hardware_address(name, mac).map(|_| Response::Applied),
        }
    }
}

fn get_request(kind: AddressKind) -> libc::Ioctl {
    (match kind {
        AddressKind::Local => libc::SIOCGIFADDR,
        AddressKind::Netmask => libc::SIOCGIFNETMASK,
        AddressKind::Broadcast => libc::SIOCGIFBRDADDR,
    }) as libc::Ioctl
}

fn set_request(kind: AddressKind) -> libc::Ioctl {
    (match kind {
        AddressKind::Local => libc::SIOCSIFADDR,
        AddressKind::Netmask => libc::SIOCSIFNETMASK,
        AddressKind::Broadcast => libc::SIOCSIFBRDADDR,
    }) as libc::Ioctl
}

unsafe fn address_field(ifr: &mut libc::ifreq, kind: AddressKind) -> &mut libc::sockaddr {
    match kind {
        AddressKind::Local => &mut ifr.ifr_ifru.ifru_addr,
        AddressKind::Netmask => &mut ifr.ifr_ifru.ifru_netmask,
        AddressKind::Broadcast => &mut ifr.ifr_ifru.ifru_broadaddr,
    }
}

fn read_in_addr(sa: &libc::sockaddr) -> Ipv4Addr {
    let sin = unsafe { std::ptr::read_unaligned(sa as *const libc::sockaddr as *const libc::sockaddr_in) };
    Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr))
}

fn write_in_addr(sa: &mut libc::sockaddr, addr: Ipv4Addr) {
    let sin = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: 0,
        sin_addr: libc::in_addr { s_addr: u32::from(addr).to_be() },
        sin_zero: [0; 8],
    };
    unsafe { std::ptr::write_unaligned(sa as *mut libc::sockaddr as *mut libc::sockaddr_in, sin) };
}

pub(crate) fn new_ifreq(name: &str) -> Result<libc::ifreq, std::io::Error> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() >= libc::IFNAMSIZ || bytes.contains(&0) {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("bad interface name {:?}", name)));
    }
    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    Ok(ifr)
}

fn ifname_to_string(raw: &[libc::c_char; libc::IFNAMSIZ]) -> String {
    let bytes = raw.iter().take_while(|c| **c != 0).map(|c| *c as u8).collect::<Vec<_>>();
    String::from_utf8_lossy(&bytes).into_owned()
}
