
use crate::control::Enumerated;
use crate::control::Family;
use crate::control::InterfaceControl;
use crate::control::Request;
use crate::error::{Error, Result};

use std::ffi::CString;
use std::io::BufRead;
use std::path::Path;

/// Longest interface name the kernel accepts, excluding the terminator.
pub const MAX_NAME_LEN: usize = libc::IFNAMSIZ - 1;

pub fn index_to_name(index: libc::c_uint) -> std::result::Result<String, std::io::Error> {
    let mut ifname_buf = [0 as libc::c_char; libc::IFNAMSIZ];
    let ret = unsafe { libc::if_indextoname(index, ifname_buf.as_mut_ptr()) };
    if ret.is_null() {
        return Err(std::io::Error::last_os_error());
    }

    let name = unsafe { std::ffi::CStr::from_ptr(ret as *const libc::c_char) };
    Ok(name.to_string_lossy().into_owned())
}

pub fn name_to_index(name: &str) -> std::result::Result<libc::c_uint, std::io::Error> {
    let name = CString::new(name).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(index)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceHandle {
    name: String,
    family: Family,
}

impl InterfaceHandle {
    pub fn new(name: &str, family: Family) -> Result<Self> {
        if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains(|c: char| c == '\0' || c == '/' || c.is_whitespace()) {
            return Err(Error::InvalidInput(format!("interface name {:?}", name)));
        }
        Ok(Self { name: name.to_owned(), family })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> Family {
        self.family
    }
}

/// Interfaces known to this process, in discovery order.
///
/// Entries are unique per (name, family) and never removed. Bulk discovery
/// misses interfaces that are administratively down, so a lookup miss
/// probes the kernel by name and appends what it finds.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<InterfaceHandle>,
    max_interfaces: Option<usize>,
}

impl Registry {
    pub fn new(max_interfaces: Option<usize>) -> Self {
        Self { entries: Vec::new(), max_interfaces }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry of the given family, in discovery order.
    pub fn iter(&self, family: Family) -> impl Iterator<Item = &InterfaceHandle> {
        self.entries.iter().filter(move |h| h.family == family)
    }

    pub fn find(&self, name: &str, family: Family) -> Option<&InterfaceHandle> {
        self.entries.iter().find(|h| h.family == family && h.name == name)
    }

    fn push(&mut self, handle: InterfaceHandle) -> Result<InterfaceHandle> {
        if let Some(max) = self.max_interfaces {
            if self.entries.len() >= max {
                log::warn!("registry full ({} entries), cannot add {}", max, handle.name);
                return Err(Error::Capacity(max));
            }
        }
        self.entries.push(handle.clone());
        Ok(handle)
    }

    /// Loads the result of a bulk enumeration.
    ///
    /// Entries of a family other than IPv4/IPv6 are dropped; duplicates are
    /// kept once.
    pub fn discover<C: InterfaceControl>(&mut self, control: &mut C) -> Result<usize> {
        let enumerated = control.enumerate()?;
        let mut added = 0;
        for Enumerated { name, family } in enumerated {
            let Some(family) = family else {
                log::debug!("skipping {}: unsupported address family", name);
                continue;
            };
            if self.find(&name, family).is_some() {
                continue;
            }
            let handle = match InterfaceHandle::new(&name, family) {
                Ok(handle) => handle,
                Err(e) => {
                    log::warn!("skipping enumerated interface: {}", e);
                    continue;
                }
            };
            self.push(handle)?;
            added += 1;
        }
        log::debug!("discovered {} interfaces", added);
        Ok(added)
    }

    /// Cached lookup with a live probe on miss.
    pub fn lookup<C: InterfaceControl>(&mut self, control: &mut C, name: &str, family: Family) -> Result<InterfaceHandle> {
        if let Some(handle) = self.find(name, family) {
            return Ok(handle.clone());
        }

        let handle = InterfaceHandle::new(name, family)?;
        match control.exchange(name, Request::GetFlags) {
            Ok(_) => {}
            Err(e) => {
                log::debug!("probe for {} failed: {}", name, e);
                return Err(Error::NotFound(name.to_owned()));
            }
        }

        log::debug!("{} absent from discovery, adding after probe", name);
        self.push(handle)
    }

    /// Forces every interface listed in the statistics file into the registry.
    ///
    /// Stops at the first interface that cannot be added.
    pub fn add_all<C: InterfaceControl, P: AsRef<Path>>(&mut self, control: &mut C, net_dev: P) -> Result<()> {
        let file = std::fs::File::open(net_dev.as_ref())?;
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            let Some((name, _)) = line.split_once(':') else {
                continue;
            };
            self.lookup(control, name.trim(), Family::Inet)?;
        }
        Ok(())
    }
}
