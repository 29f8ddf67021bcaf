
use netconfig::config::{Config, DEFAULT_CONFIG_PATH};
use netconfig::control::{Family, InterfaceControl};
use netconfig::interface::InterfaceHandle;
use netconfig::{Error, Netconf};

use clap::Parser;

use std::io::Write;
use std::path::PathBuf;


fn main() {
    env_logger::init();
    let args = Cli::parse();
    let config = Config::load_or_default(&args.config);
    log::debug!("Configuration: {:?}", config);

    let mut netconf = Netconf::system(config);
    if let Err(e) = netconf.init() {
        log::debug!("init failed: {:?}", e);
        eprintln!("Cannot init: {}", e);
        std::process::exit(1);
    }

    let ok = run(&args, &mut netconf, &mut std::io::stdout());
    netconf.clean();

    if !ok {
        std::process::exit(1);
    }
}

fn fail(op: &str, interface: &str, e: &Error) {
    log::debug!("{} on {} failed: {:?}", op, interface, e);
    eprintln!("Failed: {} on {}: {}", op, interface, e);
}

fn run<C: InterfaceControl>(args: &Cli, netconf: &mut Netconf<C>, out: &mut dyn Write) -> bool {
    if args.all {
        if let Err(e) = netconf.add_all() {
            fail("add interfaces", "host", &e);
            return false;
        }
    }

    if !args.mutates() && args.ns.is_none() {
        return match display(args, netconf, out) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Cannot write output: {}", e);
                false
            }
        };
    }

    if args.mutates() && args.interfaces.is_empty() {
        eprintln!("No interface provided");
        return false;
    }

    let mut ok = true;
    if args.configures() {
        if args.interfaces.len() != 1 {
            eprintln!("Multiple interfaces provided");
            return false;
        }
        let name = &args.interfaces[0];
        let handle = match netconf.lookup(name, Family::Inet) {
            Ok(handle) => handle,
            Err(e) => {
                fail("find interface", name, &e);
                return false;
            }
        };
        ok = configure(args, netconf, &handle);
    }

    if ok && args.save {
        for name in args.interfaces.iter() {
            let handle = match netconf.lookup(name, Family::Inet) {
                Ok(handle) => handle,
                Err(e) => {
                    fail("find interface", name, &e);
                    ok = false;
                    break;
                }
            };
            if let Err(e) = netconf.save(&handle, args.dhcp) {
                fail("write configuration", name, &e);
                ok = false;
                break;
            }
        }
    }

    if let Some(ns) = &args.ns {
        if let Err(e) = netconf.set_name_server(ns) {
            fail("set name server", "host", &e);
            ok = false;
        }
    }

    if ok {
        ok = writeln!(out, "Configuration succeeded").is_ok();
    }
    ok
}

/// Shows the named interfaces, or every registered one when none is named.
fn display<C: InterfaceControl>(args: &Cli, netconf: &mut Netconf<C>, out: &mut dyn Write) -> std::io::Result<()> {
    let mut printer = Printer::new(args.csv);
    if args.interfaces.is_empty() {
        for handle in netconf.interfaces(Family::Inet) {
            printer.show(netconf, &handle, out)?;
        }
    }
    for name in args.interfaces.iter() {
        match netconf.lookup(name, Family::Inet) {
            Ok(handle) => printer.show(netconf, &handle, out)?,
            Err(e) => {
                log::debug!("{}", e);
                eprintln!("Interface {} not found", name);
            }
        }
    }
    Ok(())
}

/// Applies every requested setting to `handle`, reporting each failure.
fn configure<C: InterfaceControl>(args: &Cli, netconf: &mut Netconf<C>, handle: &InterfaceHandle) -> bool {
    let mut ok = true;
    let mut check = |op: &str, result: Result<(), Error>| {
        if let Err(e) = result {
            fail(op, handle.name(), &e);
            ok = false;
        }
    };

    if let Some(mac) = &args.eth {
        check("set MAC address", netconf.set_hardware_address(handle, mac));
    }

    if args.dhcp {
        check("acquire dhcp lease", netconf.set_dhcp(handle));
    } else {
        if let Some(ip) = &args.ip {
            check("set IP address", netconf.set_address(handle, ip));
        }
        if let Some(mask) = &args.mask {
            check("set IP mask", netconf.set_netmask(handle, mask));
        }
        if let Some(bcast) = &args.bcast {
            check("set bcast address", netconf.set_broadcast(handle, bcast));
        }
        if let Some(gw) = &args.gw {
            check("set default gateway", netconf.set_gateway(handle, gw));
        }
    }
    ok
}

/// One line of output for an interface. Fields that cannot be read stay empty.
struct Row {
    name: String,
    plugged: bool,
    dynamic: bool,
    mac: Option<String>,
    ip: Option<String>,
    mask: Option<String>,
    bcast: Option<String>,
    gw: Option<String>,
    ns: Option<String>,
}

impl Row {
    fn read<C: InterfaceControl>(netconf: &mut Netconf<C>, handle: &InterfaceHandle) -> Self {
        Row {
            name: handle.name().to_owned(),
            plugged: netconf.is_plugged(handle).unwrap_or(false),
            dynamic: netconf.is_dynamic(handle),
            mac: netconf.hardware_address(handle).ok().map(|v| v.to_string()),
            ip: netconf.address(handle).ok().map(|v| v.to_string()),
            mask: netconf.netmask(handle).ok().map(|v| v.to_string()),
            bcast: netconf.broadcast(handle).ok().map(|v| v.to_string()),
            gw: netconf.gateway(handle).ok().flatten().map(|v| v.to_string()),
            ns: netconf.name_server().ok().flatten(),
        }
    }

    fn plain(&self) -> String {
        let mut line = self.name.clone();
        if self.dynamic {
            line.push_str(" (dyn)");
        }
        line.push_str(if self.plugged { " link: up" } else { " link: down" });
        let fields = [
            ("mac", &self.mac),
            ("ip", &self.ip),
            ("mask", &self.mask),
            ("bcast", &self.bcast),
            ("gw", &self.gw),
            ("ns", &self.ns),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                line.push_str(&format!(" {}: {}", label, value));
            }
        }
        line
    }

    fn csv(&self) -> String {
        let flag = |b: bool| if b { "1" } else { "0" };
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        [
            self.name.clone(),
            flag(self.plugged).to_owned(),
            flag(self.dynamic).to_owned(),
            field(&self.mac),
            field(&self.ip),
            field(&self.mask),
            field(&self.bcast),
            field(&self.gw),
            field(&self.ns),
        ]
        .join(",")
    }
}

struct Printer {
    csv: bool,
    header_printed: bool,
}

impl Printer {
    fn new(csv: bool) -> Self {
        Self { csv, header_printed: false }
    }

    fn show<C: InterfaceControl>(&mut self, netconf: &mut Netconf<C>, handle: &InterfaceHandle, out: &mut dyn Write) -> std::io::Result<()> {
        let row = Row::read(netconf, handle);
        if !self.csv {
            return writeln!(out, "{}", row.plain());
        }
        if !self.header_printed {
            writeln!(out, "if,plug,dyn,mac,ip,mask,bcast,gw,ns")?;
            self.header_printed = true;
        }
        writeln!(out, "{}", row.csv())
    }
}

/// Display or set network interface settings
#[derive(Debug, Clone, Parser)]
#[clap(name = "netconfig", version, about)]
pub struct Cli {
    /// Path to the configuration file
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// dhcp mode
    #[clap(short, long)]
    pub dhcp: bool,

    /// set MAC address
    #[clap(short, long, value_name = "ETHADDR")]
    pub eth: Option<String>,

    /// set ip address
    #[clap(short, long)]
    pub ip: Option<String>,

    /// set ip mask address
    #[clap(short, long)]
    pub mask: Option<String>,

    /// set broadcast address
    #[clap(short, long, value_name = "ADDR")]
    pub bcast: Option<String>,

    /// set the default gateway
    #[clap(short, long)]
    pub gw: Option<String>,

    /// set the name server
    #[clap(short, long, value_name = "SERVER")]
    pub ns: Option<String>,

    /// save the configuration
    #[clap(short, long)]
    pub save: bool,

    /// output display as a CSV
    #[clap(short, long)]
    pub csv: bool,

    /// consider all of the interfaces
    #[clap(short, long)]
    pub all: bool,

    pub interfaces: Vec<String>,
}

impl Cli {
    /// Settings applied to a single interface.
    fn configures(&self) -> bool {
        self.dhcp || self.eth.is_some() || self.ip.is_some() || self.mask.is_some() || self.bcast.is_some() || self.gw.is_some()
    }

    /// Anything that needs an interface argument.
    fn mutates(&self) -> bool {
        self.configures() || self.save
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use netconfig::control::{AddressKind, Enumerated, Request, Response};
    use netconfig::hwaddr::MacAddr;

    use nix::net::if_::InterfaceFlags;

    use std::net::Ipv4Addr;
    use std::path::Path;

    struct FakeIface {
        name: &'static str,
        flags: InterfaceFlags,
        addresses: [Option<Ipv4Addr>; 3],
        mac: MacAddr,
    }

    #[derive(Default)]
    struct FakeControl {
        open: bool,
        interfaces: Vec<FakeIface>,
        sets: usize,
    }

    fn slot(kind: AddressKind) -> usize {
        match kind {
            AddressKind::Local => 0,
            AddressKind::Netmask => 1,
            AddressKind::Broadcast => 2,
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
            Ok(self
                .interfaces
                .iter()
                .map(|i| Enumerated { name: i.name.to_owned(), family: Some(Family::Inet) })
                .collect())
        }

        fn exchange(&mut self, name: &str, request: Request) -> Result<Response, std::io::Error> {
            let iface = self
                .interfaces
                .iter_mut()
                .find(|i| i.name == name)
                .ok_or_else(|| std::io::Error::from_raw_os_error(libc::ENODEV))?;
            match request {
                Request::GetFlags => Ok(Response::Flags(iface.flags)),
                Request::GetAddress(kind) => iface.addresses[slot(kind)]
                    .map(Response::Address)
                    .ok_or_else(|| std::io::Error::from_raw_os_error(libc::EADDRNOTAVAIL)),
                Request::GetHardwareAddress => Ok(Response::HardwareAddress(iface.mac)),
                Request::SetAddress(kind, addr) => {
                    iface.addresses[slot(kind)] = Some(addr);
                    self.sets += 1;
                    Ok(Response::Applied)
                }
                Request::SetFlags(_) | Request::SetHardwareAddress(_) => {
                    self.sets += 1;
                    Ok(Response::Applied)
                }
            }
        }
    }

    /// tst0 running with an address, tst1 down without one.
    fn netconf(dir: &Path) -> Netconf<FakeControl> {
        let mut config = Config::default();
        config.paths.interfaces = dir.join("interfaces");
        config.paths.resolv_conf = dir.join("resolv.conf");
        config.paths.leases = dir.join("dhclient.leases");
        config.paths.dhclient = "true".into();
        config.paths.net_dev = dir.join("net_dev");

        let control = FakeControl {
            interfaces: vec![
                FakeIface {
                    name: "tst0",
                    flags: InterfaceFlags::IFF_UP | InterfaceFlags::IFF_RUNNING,
                    addresses: [
                        Some(Ipv4Addr::new(192, 0, 2, 10)),
                        Some(Ipv4Addr::new(255, 255, 255, 0)),
                        Some(Ipv4Addr::new(192, 0, 2, 255)),
                    ],
                    mac: MacAddr([0x52, 0x54, 0x00, 0x00, 0x00, 0x01]),
                },
                FakeIface {
                    name: "tst1",
                    flags: InterfaceFlags::empty(),
                    addresses: [None; 3],
                    mac: MacAddr([0x52, 0x54, 0x00, 0x00, 0x00, 0x02]),
                },
            ],
            ..Default::default()
        };
        let mut netconf = Netconf::new(config, control);
        netconf.init().unwrap();
        netconf
    }

    fn invoke(netconf: &mut Netconf<FakeControl>, argv: &[&str]) -> (bool, String) {
        let args = Cli::parse_from(std::iter::once("netconfig").chain(argv.iter().copied()));
        let mut out = Vec::new();
        let ok = run(&args, netconf, &mut out);
        (ok, String::from_utf8(out).unwrap())
    }

    #[test]
    fn save_stops_at_unknown_interface() {
        let dir = tempfile::tempdir().unwrap();
        let mut netconf = netconf(dir.path());
        let (ok, out) = invoke(&mut netconf, &["-s", "bogus0", "tst0"]);
        assert!(!ok);
        assert!(!out.contains("Configuration succeeded"));
        assert!(!dir.path().join("interfaces").exists());
    }

    #[test]
    fn save_writes_every_named_interface() {
        let dir = tempfile::tempdir().unwrap();
        let mut netconf = netconf(dir.path());
        let (ok, out) = invoke(&mut netconf, &["-s", "tst0", "tst1"]);
        assert!(ok);
        assert_eq!(out, "Configuration succeeded\n");
        let text = std::fs::read_to_string(dir.path().join("interfaces")).unwrap();
        assert!(text.starts_with("auto tst0\niface tst0 inet static\n\taddress 192.0.2.10\n"));
        assert!(text.contains("auto tst1\niface tst1 inet static\n"));
    }

    #[test]
    fn settings_need_exactly_one_interface() {
        let dir = tempfile::tempdir().unwrap();
        let mut netconf = netconf(dir.path());
        let (ok, out) = invoke(&mut netconf, &["-i", "192.0.2.20", "tst0", "tst1"]);
        assert!(!ok);
        assert!(out.is_empty());
        assert_eq!(netconf.control().sets, 0);

        let (ok, _) = invoke(&mut netconf, &["-m", "255.255.255.255"]);
        assert!(!ok);
        assert_eq!(netconf.control().sets, 0);
    }

    #[test]
    fn settings_apply_to_the_named_interface() {
        let dir = tempfile::tempdir().unwrap();
        let mut netconf = netconf(dir.path());
        let (ok, out) = invoke(&mut netconf, &["-i", "192.0.2.20", "-m", "255.255.255.255", "tst0"]);
        assert!(ok);
        assert_eq!(out, "Configuration succeeded\n");
        assert_eq!(netconf.control().sets, 2);

        let (ok, out) = invoke(&mut netconf, &["-i", "192.0.2", "tst0"]);
        assert!(!ok);
        assert!(out.is_empty());
    }

    #[test]
    fn name_server_needs_no_interface() {
        let dir = tempfile::tempdir().unwrap();
        let mut netconf = netconf(dir.path());
        let (ok, out) = invoke(&mut netconf, &["-n", "9.9.9.9"]);
        assert!(ok);
        assert_eq!(out, "Configuration succeeded\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("resolv.conf")).unwrap(), "nameserver\t9.9.9.9\n");

        let (ok, _) = invoke(&mut netconf, &["-n", "dns.example"]);
        assert!(!ok);
    }

    #[test]
    fn csv_header_printed_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut netconf = netconf(dir.path());
        let (ok, out) = invoke(&mut netconf, &["-c", "tst0", "bogus0", "tst1"]);
        assert!(ok);
        assert_eq!(
            out,
            "if,plug,dyn,mac,ip,mask,bcast,gw,ns\n\
             tst0,1,0,52:54:00:00:00:01,192.0.2.10,255.255.255.0,192.0.2.255,,\n\
             tst1,0,0,52:54:00:00:00:02,,,,,\n"
        );
    }

    #[test]
    fn plain_display_of_every_interface() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dhclient.leases"), "lease {\n  interface \"tst0\";\n}\n").unwrap();
        std::fs::write(dir.path().join("resolv.conf"), "nameserver 192.0.2.53\n").unwrap();
        let mut netconf = netconf(dir.path());
        let (ok, out) = invoke(&mut netconf, &[]);
        assert!(ok);
        assert_eq!(
            out,
            "tst0 (dyn) link: up mac: 52:54:00:00:00:01 ip: 192.0.2.10 mask: 255.255.255.0 bcast: 192.0.2.255 ns: 192.0.2.53\n\
             tst1 link: down mac: 52:54:00:00:00:02 ns: 192.0.2.53\n"
        );
    }
}
