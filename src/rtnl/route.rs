
use netlink_packet_core::NetlinkMessage;
use netlink_packet_core::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REQUEST};
use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteMessage, RouteProtocol, RouteScope, RouteType};
use netlink_packet_route::AddressFamily;
use netlink_packet_route::RouteNetlinkMessage;

use std::net::Ipv4Addr;

pub const RT_TABLE_MAIN: u32 = 254;

/// The fields of one route message this crate cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRecord {
    pub table: u32,
    pub destination: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub output_interface: Option<u32>,
}

impl RouteRecord {
    /// Extracts an IPv4 record from a route message. Attributes are read in
    /// wire order; a repeated attribute overrides the earlier one.
    pub fn parse(message: &RouteMessage) -> Option<Self> {
        if message.header.address_family != AddressFamily::Inet {
            return None;
        }

        let mut record = RouteRecord {
            table: message.header.table as u32,
            destination: None,
            gateway: None,
            output_interface: None,
        };

        for attribute in message.attributes.iter() {
            match attribute {
                RouteAttribute::Oif(index) => record.output_interface = Some(*index),
                RouteAttribute::Gateway(RouteAddress::Inet(addr)) => record.gateway = Some(*addr),
                RouteAttribute::Destination(RouteAddress::Inet(addr)) => record.destination = Some(*addr),
                RouteAttribute::Table(table) => record.table = *table,
                _ => {}
            }
        }

        Some(record)
    }

    /// Parses only records from the main table.
    pub fn parse_main(message: &RouteMessage) -> Option<Self> {
        Self::parse(message).filter(|record| record.table == RT_TABLE_MAIN)
    }

    /// A missing destination attribute means the unspecified address.
    pub fn is_default(&self) -> bool {
        self.destination.unwrap_or(Ipv4Addr::UNSPECIFIED).is_unspecified()
    }
}

/// First main-table default route leaving through `if_name` that has a gateway.
pub fn find_default_gateway<F>(messages: &[RouteMessage], if_name: &str, index_to_name: F) -> Option<Ipv4Addr>
where
    F: Fn(u32) -> Option<String>,
{
    for message in messages {
        let Some(record) = RouteRecord::parse_main(message) else {
            continue;
        };
        if !record.is_default() {
            continue;
        }
        let Some(oif) = record.output_interface else {
            continue;
        };
        if index_to_name(oif).as_deref() != Some(if_name) {
            continue;
        }
        if let Some(gateway) = record.gateway {
            log::debug!("default gateway for {}: {}", if_name, gateway);
            return Some(gateway);
        }
    }
    None
}

fn serialize(mut message: NetlinkMessage<RouteNetlinkMessage>, flags: u16, sequence: u32, port: u32) -> Vec<u8> {
    message.header.flags = flags;
    message.header.sequence_number = sequence;
    message.header.port_number = port;
    message.finalize();
    let mut buf = vec![0u8; message.buffer_len()];
    message.serialize(&mut buf);
    buf
}

pub fn dump_request(sequence: u32, port: u32) -> Vec<u8> {
    let mut route = RouteMessage::default();
    route.header.address_family = AddressFamily::Inet;
    let message = NetlinkMessage::from(RouteNetlinkMessage::GetRoute(route));
    serialize(message, NLM_F_REQUEST | NLM_F_DUMP, sequence, port)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayChange {
    Add,
    Delete,
}

/// Default route via `gateway` out of interface `oif`, in the main table.
pub fn gateway_request(change: GatewayChange, oif: u32, gateway: Ipv4Addr, sequence: u32, port: u32) -> Vec<u8> {
    let mut route = RouteMessage::default();
    route.header.address_family = AddressFamily::Inet;
    route.header.destination_prefix_length = 0;
    route.header.table = RT_TABLE_MAIN as u8;
    route.header.protocol = RouteProtocol::Boot;
    route.header.scope = RouteScope::Universe;
    route.header.kind = RouteType::Unicast;
    route.attributes.push(RouteAttribute::Gateway(RouteAddress::Inet(gateway)));
    route.attributes.push(RouteAttribute::Oif(oif));

    match change {
        GatewayChange::Add => {
            let message = NetlinkMessage::from(RouteNetlinkMessage::NewRoute(route));
            serialize(message, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL, sequence, port)
        }
        GatewayChange::Delete => {
            let message = NetlinkMessage::from(RouteNetlinkMessage::DelRoute(route));
            serialize(message, NLM_F_REQUEST | NLM_F_ACK, sequence, port)
        }
    }
}
