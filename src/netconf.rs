//! The owned context every interface operation goes through.

use crate::config::Config;
use crate::control::{AddressKind, ControlSocket, Family, InterfaceControl, Request, Response};
use crate::dhcp::DhcpDelegate;
use crate::error::{Error, Result};
use crate::hwaddr::MacAddr;
use crate::interface::{self, InterfaceHandle, Registry};
use crate::persist::{self, StanzaMode, StaticSettings};
use crate::rtnl::{GatewayChange, RouteResolver, RouteSocket, RouteTransport};

use nix::net::if_::InterfaceFlags;

use std::net::Ipv4Addr;

/// Control channel, interface registry and route resolver for one run.
#[derive(Debug)]
pub struct Netconf<C: InterfaceControl = ControlSocket> {
    config: Config,
    control: C,
    registry: Registry,
    resolver: RouteResolver,
    dhcp: DhcpDelegate,
    discovered: bool,
}

impl Netconf<ControlSocket> {
    /// Context backed by the kernel control socket.
    pub fn system(config: Config) -> Self {
        Self::new(config, ControlSocket::new())
    }
}

impl<C: InterfaceControl> Netconf<C> {
    pub fn new(config: Config, control: C) -> Self {
        let registry = Registry::new(config.registry.max_interfaces);
        let resolver = RouteResolver::new(config.netlink.receive_buffer);
        let dhcp = DhcpDelegate::new(&config.paths.leases, &config.paths.dhclient);
        Self {
            config,
            control,
            registry,
            resolver,
            dhcp,
            discovered: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Opens the control channel and runs bulk discovery once.
    ///
    /// Calling it again after success does nothing.
    pub fn init(&mut self) -> Result<()> {
        if !self.control.is_open() {
            self.control.init()?;
        }
        if !self.discovered {
            self.registry.discover(&mut self.control)?;
            self.discovered = true;
        }
        Ok(())
    }

    /// Closes the control channel. The registry is kept.
    pub fn clean(&mut self) {
        self.control.clean();
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.control.is_open() {
            return Err(Error::Uninitialized);
        }
        Ok(())
    }

    pub fn lookup(&mut self, name: &str, family: Family) -> Result<InterfaceHandle> {
        self.ensure_open()?;
        self.registry.lookup(&mut self.control, name, family)
    }

    /// Registers every interface listed in the statistics file.
    pub fn add_all(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.registry.add_all(&mut self.control, &self.config.paths.net_dev)
    }

    /// Registry entries of `family`, in discovery order.
    pub fn interfaces(&self, family: Family) -> Vec<InterfaceHandle> {
        self.registry.iter(family).cloned().collect()
    }

    fn exchange(&mut self, handle: &InterfaceHandle, request: Request) -> Result<Response> {
        self.ensure_open()?;
        self.control
            .exchange(handle.name(), request)
            .map_err(|e| Error::kernel(request.op(), handle.name(), e))
    }

    fn unexpected(request: Request, handle: &InterfaceHandle, response: Response) -> Error {
        let source = std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unexpected response {:?}", response));
        Error::kernel(request.op(), handle.name(), source)
    }

    pub fn flags(&mut self, handle: &InterfaceHandle) -> Result<InterfaceFlags> {
        match self.exchange(handle, Request::GetFlags)? {
            Response::Flags(flags) => Ok(flags),
            other => Err(Self::unexpected(Request::GetFlags, handle, other)),
        }
    }

    /// Administratively up and running.
    pub fn is_plugged(&mut self, handle: &InterfaceHandle) -> Result<bool> {
        let flags = self.flags(handle)?;
        Ok(flags.contains(InterfaceFlags::IFF_UP | InterfaceFlags::IFF_RUNNING))
    }

    pub fn set_link_up(&mut self, handle: &InterfaceHandle, up: bool) -> Result<()> {
        let mut flags = self.flags(handle)?;
        flags.set(InterfaceFlags::IFF_UP, up);
        self.exchange(handle, Request::SetFlags(flags))?;
        log::info!("{}: link {}", handle.name(), if up { "up" } else { "down" });
        Ok(())
    }

    fn get_address(&mut self, handle: &InterfaceHandle, kind: AddressKind) -> Result<Ipv4Addr> {
        if !self.is_plugged(handle)? {
            return Err(Error::DeviceDown(handle.name().to_owned()));
        }
        let request = Request::GetAddress(kind);
        match self.exchange(handle, request)? {
            Response::Address(addr) => Ok(addr),
            other => Err(Self::unexpected(request, handle, other)),
        }
    }

    fn set_address_of(&mut self, handle: &InterfaceHandle, kind: AddressKind, text: &str) -> Result<()> {
        let addr = text
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|_| Error::InvalidInput(format!("{} {:?}", kind.name(), text)))?;
        self.exchange(handle, Request::SetAddress(kind, addr))?;
        log::info!("{}: {} set to {}", handle.name(), kind.name(), addr);
        Ok(())
    }

    pub fn address(&mut self, handle: &InterfaceHandle) -> Result<Ipv4Addr> {
        self.get_address(handle, AddressKind::Local)
    }

    pub fn netmask(&mut self, handle: &InterfaceHandle) -> Result<Ipv4Addr> {
        self.get_address(handle, AddressKind::Netmask)
    }

    pub fn broadcast(&mut self, handle: &InterfaceHandle) -> Result<Ipv4Addr> {
        self.get_address(handle, AddressKind::Broadcast)
    }

    pub fn set_address(&mut self, handle: &InterfaceHandle, text: &str) -> Result<()> {
        self.set_address_of(handle, AddressKind::Local, text)
    }

    pub fn set_netmask(&mut self, handle: &InterfaceHandle, text: &str) -> Result<()> {
        self.set_address_of(handle, AddressKind::Netmask, text)
    }

    pub fn set_broadcast(&mut self, handle: &InterfaceHandle, text: &str) -> Result<()> {
        self.set_address_of(handle, AddressKind::Broadcast, text)
    }

    fn refuse_loopback(&mut self, handle: &InterfaceHandle, op: &'static str) -> Result<()> {
        if self.flags(handle)?.contains(InterfaceFlags::IFF_LOOPBACK) {
            return Err(Error::Unsupported { op, interface: handle.name().to_owned() });
        }
        Ok(())
    }

    pub fn hardware_address(&mut self, handle: &InterfaceHandle) -> Result<MacAddr> {
        self.refuse_loopback(handle, Request::GetHardwareAddress.op())?;
        match self.exchange(handle, Request::GetHardwareAddress)? {
            Response::HardwareAddress(mac) => Ok(mac),
            other => Err(Self::unexpected(Request::GetHardwareAddress, handle, other)),
        }
    }

    pub fn set_hardware_address(&mut self, handle: &InterfaceHandle, text: &str) -> Result<()> {
        let mac = text
            .trim()
            .parse::<MacAddr>()
            .map_err(|e| Error::InvalidInput(format!("hardware address {:?}: {}", text, e)))?;
        let request = Request::SetHardwareAddress(mac);
        self.refuse_loopback(handle, request.op())?;
        self.exchange(handle, request)?;
        log::info!("{}: hardware address set to {}", handle.name(), mac);
        Ok(())
    }

    /// Default gateway of `handle` from the main routing table.
    pub fn gateway(&mut self, handle: &InterfaceHandle) -> Result<Option<Ipv4Addr>> {
        let mut socket = RouteSocket::new()?;
        self.gateway_via(&mut socket, handle, |index| interface::index_to_name(index).ok())
    }

    /// Same as [`Netconf::gateway`] over a caller-supplied transport.
    pub fn gateway_via<T, F>(&mut self, transport: &mut T, handle: &InterfaceHandle, index_to_name: F) -> Result<Option<Ipv4Addr>>
    where
        T: RouteTransport,
        F: Fn(u32) -> Option<String>,
    {
        self.resolver.default_gateway(transport, handle.name(), index_to_name)
    }

    fn change_gateway(&mut self, handle: &InterfaceHandle, change: GatewayChange, text: &str) -> Result<()> {
        let gateway = text
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|_| Error::InvalidInput(format!("gateway {:?}", text)))?;
        let oif = interface::name_to_index(handle.name()).map_err(|_| Error::NotFound(handle.name().to_owned()))?;
        let mut socket = RouteSocket::new()?;
        self.resolver.change_gateway(&mut socket, change, handle.name(), oif, gateway)?;
        log::info!("{}: default gateway {:?} {}", handle.name(), change, gateway);
        Ok(())
    }

    pub fn set_gateway(&mut self, handle: &InterfaceHandle, text: &str) -> Result<()> {
        self.change_gateway(handle, GatewayChange::Add, text)
    }

    pub fn delete_gateway(&mut self, handle: &InterfaceHandle, text: &str) -> Result<()> {
        self.change_gateway(handle, GatewayChange::Delete, text)
    }

    /// Live address, netmask and broadcast. Values that cannot be read are
    /// left out.
    pub fn capture(&mut self, handle: &InterfaceHandle) -> StaticSettings {
        let mut settings = StaticSettings::default();
        for (kind, slot) in [
            (AddressKind::Local, &mut settings.address),
            (AddressKind::Netmask, &mut settings.netmask),
            (AddressKind::Broadcast, &mut settings.broadcast),
        ] {
            match self.get_address(handle, kind) {
                Ok(addr) => *slot = Some(addr),
                Err(e) => log::debug!("{}: {} not captured: {}", handle.name(), kind.name(), e),
            }
        }
        settings
    }

    /// Persists the current settings of `handle`, or a dhcp stanza.
    pub fn save(&mut self, handle: &InterfaceHandle, dhcp: bool) -> Result<()> {
        let mode = if dhcp {
            StanzaMode::Automatic
        } else {
            let mut settings = self.capture(handle);
            settings.gateway = match self.gateway(handle) {
                Ok(gateway) => gateway,
                Err(e) => {
                    log::warn!("{}: gateway not captured: {}", handle.name(), e);
                    None
                }
            };
            StanzaMode::Manual(settings)
        };
        self.save_mode(handle, &mode)
    }

    pub fn save_mode(&self, handle: &InterfaceHandle, mode: &StanzaMode) -> Result<()> {
        persist::save_stanza(&self.config.paths.interfaces, handle.name(), mode)
    }

    pub fn name_server(&self) -> Result<Option<String>> {
        persist::get_name_server(&self.config.paths.resolv_conf)
    }

    pub fn set_name_server(&self, text: &str) -> Result<()> {
        persist::set_name_server(&self.config.paths.resolv_conf, text)
    }

    pub fn is_dynamic(&self, handle: &InterfaceHandle) -> bool {
        self.dhcp.is_dynamic(handle.name())
    }

    /// Hands `handle` to the lease client and waits for it.
    pub fn set_dhcp(&self, handle: &InterfaceHandle) -> Result<()> {
        self.dhcp.acquire_lease(handle.name())
    }
}
