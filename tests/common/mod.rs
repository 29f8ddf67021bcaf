//! In-memory stand-ins for the kernel used by the integration tests.

#![allow(dead_code)]

use netconfig::config::Config;
use netconfig::control::{AddressKind, Enumerated, Family, InterfaceControl, Request, Response};
use netconfig::hwaddr::MacAddr;
use netconfig::rtnl::RouteTransport;
use netconfig::Netconf;

use netlink_packet_core::{NetlinkMessage, NLMSG_DONE, NLM_F_MULTIPART};
use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteMessage};
use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};

use nix::net::if_::InterfaceFlags;

use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct FakeInterface {
    pub name: String,
    pub flags: InterfaceFlags,
    pub address: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub broadcast: Option<Ipv4Addr>,
    pub mac: MacAddr,
    /// Reported by bulk enumeration. Interfaces without an address are not.
    pub enumerated: bool,
}

impl FakeInterface {
    fn address_mut(&mut self, kind: AddressKind) -> &mut Option<Ipv4Addr> {
        match kind {
            AddressKind::Local => &mut self.address,
            AddressKind::Netmask => &mut self.netmask,
            AddressKind::Broadcast => &mut self.broadcast,
        }
    }
}

/// A kernel answering control requests from a fixed interface table.
#[derive(Debug, Default)]
pub struct FakeControl {
    open: bool,
    pub interfaces: Vec<FakeInterface>,
    /// Extra bulk enumeration entries, e.g. other address families.
    pub extra: Vec<Enumerated>,
    /// errno returned for every set request when present.
    pub reject: Option<i32>,
    pub enumerations: usize,
    pub requests: Vec<(String, Request)>,
}

impl FakeControl {
    pub fn interface(&self, name: &str) -> Option<&FakeInterface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    fn check_reject(&self) -> Result<(), std::io::Error> {
        match self.reject {
            Some(errno) => Err(std::io::Error::from_raw_os_error(errno)),
            None => Ok(()),
        }
    }
}

impl InterfaceControl for FakeControl {
    fn init(&mut self) -> Result<(), std::io::Error> {
        self.open = true;
        Ok(())
    }

    fn clean(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn enumerate(&mut self) -> Result<Vec<Enumerated>, std::io::Error> {
        self.enumerations += 1;
        let mut entries = self
            .interfaces
            .iter()
            .filter(|i| i.enumerated)
            .map(|i| Enumerated { name: i.name.clone(), family: Some(Family::Inet) })
            .collect::<Vec<_>>();
        entries.extend(self.extra.iter().cloned());
        Ok(entries)
    }

    fn exchange(&mut self, name: &str, request: Request) -> Result<Response, std::io::Error> {
        self.requests.push((name.to_owned(), request));
        let reject = self.check_reject();
        let iface = self
            .interfaces
            .iter_mut()
            .find(|i| i.name == name)
            .ok_or_else(|| std::io::Error::from_raw_os_error(libc::ENODEV))?;

        match request {
            Request::GetFlags => Ok(Response::Flags(iface.flags)),
            Request::SetFlags(flags) => {
                reject?;
                iface.flags = flags;
                Ok(Response::Applied)
            }
            Request::GetAddress(kind) => match *iface.address_mut(kind) {
                Some(addr) => Ok(Response::Address(addr)),
                None => Err(std::io::Error::from_raw_os_error(libc::EADDRNOTAVAIL)),
            },
            Request::SetAddress(kind, addr) => {
                reject?;
                *iface.address_mut(kind) = Some(addr);
                Ok(Response::Applied)
            }
            Request::GetHardwareAddress => Ok(Response::HardwareAddress(iface.mac)),
            Request::SetHardwareAddress(mac) => {
                reject?;
                iface.mac = mac;
                Ok(Response::Applied)
            }
        }
    }
}

/// lo and eth0 up and running, eth1 up without carrier, eth2 down and
/// without an address.
pub fn host() -> FakeControl {
    let running = InterfaceFlags::IFF_UP | InterfaceFlags::IFF_RUNNING;
    FakeControl {
        interfaces: vec![
            FakeInterface {
                name: "lo".to_owned(),
                flags: running | InterfaceFlags::IFF_LOOPBACK,
                address: Some(Ipv4Addr::LOCALHOST),
                netmask: Some(Ipv4Addr::new(255, 0, 0, 0)),
                broadcast: None,
                mac: MacAddr::default(),
                enumerated: true,
            },
            FakeInterface {
                name: "eth0".to_owned(),
                flags: running | InterfaceFlags::IFF_BROADCAST,
                address: Some(Ipv4Addr::new(192, 168, 1, 10)),
                netmask: Some(Ipv4Addr::new(255, 255, 255, 0)),
                broadcast: Some(Ipv4Addr::new(192, 168, 1, 255)),
                mac: MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]),
                enumerated: true,
            },
            FakeInterface {
                name: "eth1".to_owned(),
                flags: InterfaceFlags::IFF_UP | InterfaceFlags::IFF_BROADCAST,
                address: Some(Ipv4Addr::new(10, 0, 0, 2)),
                netmask: Some(Ipv4Addr::new(255, 255, 255, 0)),
                broadcast: Some(Ipv4Addr::new(10, 0, 0, 255)),
                mac: MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x57]),
                enumerated: true,
            },
            FakeInterface {
                name: "eth2".to_owned(),
                flags: InterfaceFlags::IFF_BROADCAST,
                address: None,
                netmask: None,
                broadcast: None,
                mac: MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x58]),
                enumerated: false,
            },
        ],
        ..Default::default()
    }
}

/// Config with every path inside `dir`.
pub fn config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.interfaces = dir.join("interfaces");
    config.paths.resolv_conf = dir.join("resolv.conf");
    config.paths.leases = dir.join("dhclient.leases");
    config.paths.dhclient = "true".into();
    config.paths.net_dev = dir.join("net_dev");
    config
}

pub fn netconf(dir: &Path) -> Netconf<FakeControl> {
    let mut netconf = Netconf::new(config(dir), host());
    netconf.init().unwrap();
    netconf
}

/// Answers every request with datagrams built from its sequence number and port.
pub struct ReplayTransport {
    pub port: u32,
    pub sent: Vec<Vec<u8>>,
    replies: Vec<Box<dyn Fn(u32, u32) -> Vec<u8>>>,
}

impl ReplayTransport {
    pub fn new(port: u32) -> Self {
        Self { port, sent: Vec::new(), replies: Vec::new() }
    }

    pub fn reply(mut self, datagram: impl Fn(u32, u32) -> Vec<u8> + 'static) -> Self {
        self.replies.push(Box::new(datagram));
        self
    }
}

impl RouteTransport for ReplayTransport {
    fn port_id(&self) -> u32 {
        self.port
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, std::io::Error> {
        self.sent.push(buf.to_vec());
        Ok(buf.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        let request = self.sent.last().ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotConnected))?;
        let sequence = u32::from_ne_bytes([request[8], request[9], request[10], request[11]]);
        if self.replies.is_empty() {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        let datagram = (self.replies.remove(0))(sequence, self.port);
        buf[..datagram.len()].copy_from_slice(&datagram);
        Ok(datagram.len())
    }
}

/// Default route in `table` via `gateway` out of `oif`, as one dump part.
pub fn default_route(sequence: u32, port: u32, table: u8, oif: u32, gateway: Ipv4Addr) -> Vec<u8> {
    let mut route = RouteMessage::default();
    route.header.address_family = AddressFamily::Inet;
    route.header.table = table;
    route.attributes = vec![
        RouteAttribute::Gateway(RouteAddress::Inet(gateway)),
        RouteAttribute::Oif(oif),
        RouteAttribute::Destination(RouteAddress::Inet(Ipv4Addr::UNSPECIFIED)),
    ];
    let mut message = NetlinkMessage::from(RouteNetlinkMessage::NewRoute(route));
    message.header.flags = NLM_F_MULTIPART;
    message.header.sequence_number = sequence;
    message.header.port_number = port;
    message.finalize();
    let mut buf = vec![0u8; message.buffer_len()];
    message.serialize(&mut buf);
    buf
}

pub fn done(sequence: u32, port: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    buf.extend_from_slice(&20u32.to_ne_bytes());
    buf.extend_from_slice(&NLMSG_DONE.to_ne_bytes());
    buf.extend_from_slice(&NLM_F_MULTIPART.to_ne_bytes());
    buf.extend_from_slice(&sequence.to_ne_bytes());
    buf.extend_from_slice(&port.to_ne_bytes());
    buf.extend_from_slice(&0i32.to_ne_bytes());
    buf
}
