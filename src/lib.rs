
pub mod config;
pub mod control;
pub mod dhcp;
pub mod error;
pub mod hwaddr;
pub mod interface;
pub mod netconf;
pub mod persist;
pub mod rtnl;

pub use error::{Error, Result};
pub use netconf::Netconf;
