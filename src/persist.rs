//! Persistence of interface stanzas (interfaces(5)) and the name server.
//!
//! Files are always rewritten through a temporary file in the same
//! directory and renamed over the original, so readers see either the old
//! or the new content.

use crate::error::{Error, Result};

use std::fmt::Write as _;
use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const FILE_MODE: u32 = 0o644;

/// Live settings captured for a static stanza. Missing values are omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StaticSettings {
    pub address: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub broadcast: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaMode {
    Manual(StaticSettings),
    Automatic,
}

pub fn render_stanza(if_name: &str, mode: &StanzaMode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "auto {}", if_name);
    match mode {
        StanzaMode::Automatic => {
            let _ = writeln!(out, "iface {} inet dhcp", if_name);
        }
        StanzaMode::Manual(settings) => {
            let _ = writeln!(out, "iface {} inet static", if_name);
            let fields = [
                ("address", settings.address),
                ("netmask", settings.netmask),
                ("broadcast", settings.broadcast),
                ("gateway", settings.gateway),
            ];
            for (key, value) in fields {
                if let Some(value) = value {
                    let _ = writeln!(out, "\t{} {}", key, value);
                }
            }
        }
    }
    out
}

fn is_boundary(keyword: &str) -> bool {
    matches!(keyword, "iface" | "mapping" | "auto" | "source" | "source-directory") || keyword.starts_with("allow-")
}

enum LineKind<'a> {
    /// `iface`/`mapping` header of the stanza being replaced
    TargetHeader,
    /// `auto`/`allow-*` line naming the target; holds the remaining names
    TargetMarker { keyword: &'a str, others: Vec<&'a str> },
    OtherBoundary,
    Blank,
    Body,
}

fn classify<'a>(line: &'a str, if_name: &str) -> LineKind<'a> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return LineKind::Blank;
    }
    let mut words = trimmed.split_whitespace();
    let keyword = words.next().unwrap_or_default();
    if !is_boundary(keyword) {
        return LineKind::Body;
    }
    let rest = words.collect::<Vec<_>>();
    match keyword {
        "iface" if rest.first() == Some(&if_name) && rest.get(1) != Some(&"inet6") => LineKind::TargetHeader,
        "mapping" if rest.first() == Some(&if_name) => LineKind::TargetHeader,
        "auto" => marker(keyword, rest, if_name),
        k if k.starts_with("allow-") => marker(keyword, rest, if_name),
        _ => LineKind::OtherBoundary,
    }
}

fn marker<'a>(keyword: &'a str, rest: Vec<&'a str>, if_name: &str) -> LineKind<'a> {
    if !rest.contains(&if_name) {
        return LineKind::OtherBoundary;
    }
    let others = rest.into_iter().filter(|name| *name != if_name).collect();
    LineKind::TargetMarker { keyword, others }
}

/// Copies `original` to `out`, replacing the stanza of `if_name` with `stanza`.
///
/// The new stanza takes the place of the first old one, or is appended when
/// the interface had none. Comment and blank lines trailing the removed
/// stanza stay with whatever follows it.
pub fn merge_stanza<R: BufRead, W: Write + ?Sized>(original: Option<R>, out: &mut W, if_name: &str, stanza: &str) -> std::io::Result<()> {
    let mut inserted = false;
    let mut skipping = false;
    let mut pending: Vec<String> = Vec::new();
    let mut ends_with_newline = true;

    if let Some(mut original) = original {
        let mut line = String::new();
        loop {
            line.clear();
            if original.read_line(&mut line)? == 0 {
                break;
            }
            ends_with_newline = line.ends_with('\n');

            match classify(&line, if_name) {
                LineKind::TargetHeader => {
                    pending.clear();
                    if !inserted {
                        out.write_all(stanza.as_bytes())?;
                        inserted = true;
                        log::debug!("replacing stanza of {}", if_name);
                    }
                    skipping = true;
                }
                LineKind::TargetMarker { keyword, others } => {
                    flush(out, &mut pending)?;
                    skipping = false;
                    if !others.is_empty() {
                        writeln!(out, "{} {}", keyword, others.join(" "))?;
                    }
                }
                LineKind::OtherBoundary => {
                    flush(out, &mut pending)?;
                    skipping = false;
                    out.write_all(line.as_bytes())?;
                }
                LineKind::Blank if skipping => pending.push(line.clone()),
                LineKind::Body if skipping => pending.clear(),
                LineKind::Blank | LineKind::Body => out.write_all(line.as_bytes())?,
            }
        }
        flush(out, &mut pending)?;
    }

    if !inserted {
        if !ends_with_newline {
            out.write_all(b"\n")?;
        }
        out.write_all(stanza.as_bytes())?;
    }
    Ok(())
}

fn flush<W: Write + ?Sized>(out: &mut W, pending: &mut Vec<String>) -> std::io::Result<()> {
    for line in pending.drain(..) {
        out.write_all(line.as_bytes())?;
    }
    Ok(())
}

/// Writes `path` through a temporary sibling file renamed over it.
///
/// When `write` fails the temporary file is removed and `path` is untouched.
pub fn write_atomically<P, F>(path: P, write: F) -> std::io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = std::io::BufWriter::new(file.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    let mode = match std::fs::metadata(path) {
        Ok(metadata) => metadata.permissions().mode() & 0o7777,
        Err(_) => FILE_MODE,
    };
    file.as_file().set_permissions(std::fs::Permissions::from_mode(mode))?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

/// Replaces the stanza of `if_name` in the interfaces file.
pub fn save_stanza<P: AsRef<Path>>(path: P, if_name: &str, mode: &StanzaMode) -> Result<()> {
    let path = path.as_ref();
    let stanza = render_stanza(if_name, mode);
    let original = match std::fs::File::open(path) {
        Ok(file) => Some(BufReader::new(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(Error::Io(e)),
    };
    write_atomically(path, |out| merge_stanza(original, out, if_name, &stanza))?;
    log::info!("saved configuration of {} to {}", if_name, path.display());
    Ok(())
}

/// Replaces the name resolver file with a single `nameserver` entry.
pub fn set_name_server<P: AsRef<Path>>(path: P, server: &str) -> Result<()> {
    let server = server
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| Error::InvalidInput(format!("name server {:?}", server)))?;
    write_atomically(path.as_ref(), |out| writeln!(out, "nameserver\t{}", server))?;
    log::info!("name server set to {}", server);
    Ok(())
}

/// Reads the name server. The last `nameserver` entry wins; a missing file
/// or a file without entries yields `None`.
pub fn get_name_server<P: AsRef<Path>>(path: P) -> Result<Option<String>> {
    let file = match std::fs::File::open(path.as_ref()) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    Ok(parse_name_server(BufReader::new(file))?)
}

pub fn parse_name_server<R: BufRead>(reader: R) -> std::io::Result<Option<String>> {
    let mut server = None;
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let mut words = line.split_whitespace();
        if words.next() != Some("nameserver") {
            continue;
        }
        if let Some(value) = words.next() {
            server = Some(value.to_owned());
        }
    }
    Ok(server)
}
