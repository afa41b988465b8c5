//! Name resolution for filter values: hosts through the system resolver,
//! services and protocols through the system databases.

use std::fs;
use std::net::{IpAddr, ToSocketAddrs};

use tracing::debug;

use super::error::FilterError;

const SERVICES_DB: &str = "/etc/services";
const PROTOCOLS_DB: &str = "/etc/protocols";

const BUILTIN_SERVICES: &[(&str, u16)] = &[
    ("ftp-data", 20),
    ("ftp", 21),
    ("ssh", 22),
    ("telnet", 23),
    ("smtp", 25),
    ("domain", 53),
    ("bootps", 67),
    ("bootpc", 68),
    ("http", 80),
    ("pop3", 110),
    ("ntp", 123),
    ("imap", 143),
    ("snmp", 161),
    ("ldap", 389),
    ("https", 443),
    ("syslog", 514),
    ("imaps", 993),
    ("pop3s", 995),
];

const BUILTIN_PROTOCOLS: &[(&str, u8)] = &[
    ("icmp", 1),
    ("igmp", 2),
    ("tcp", 6),
    ("udp", 17),
    ("ipv6", 41),
    ("gre", 47),
    ("esp", 50),
    ("ah", 51),
    ("ipv6-icmp", 58),
    ("sctp", 132),
];

pub(crate) fn resolve_host(name: &str) -> Result<IpAddr, FilterError> {
    let unresolved = || FilterError::UnresolvedHost {
        name: name.to_string(),
    };
    let mut addrs = (name, 0).to_socket_addrs().map_err(|_| unresolved())?;
    let addr = addrs.next().ok_or_else(unresolved)?;
    debug!(host = name, addr = %addr.ip(), "resolved filter host");
    Ok(addr.ip())
}

pub(crate) fn lookup_service(name: &str) -> Result<u16, FilterError> {
    fs::read_to_string(SERVICES_DB)
        .ok()
        .and_then(|db| find_service(&db, name))
        .or_else(|| builtin(BUILTIN_SERVICES, name))
        .ok_or_else(|| FilterError::UnknownService {
            name: name.to_string(),
        })
}

pub(crate) fn lookup_protocol(name: &str) -> Result<u8, FilterError> {
    fs::read_to_string(PROTOCOLS_DB)
        .ok()
        .and_then(|db| find_protocol(&db, name))
        .or_else(|| builtin(BUILTIN_PROTOCOLS, name))
        .ok_or_else(|| FilterError::UnknownProtocol {
            name: name.to_string(),
        })
}

fn builtin<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, value)| *value)
}

/// Lines look like `http  80/tcp  www  # comment`.
fn find_service(db: &str, name: &str) -> Option<u16> {
    db_entries(db).find_map(|fields| {
        let port = fields.get(1)?.split('/').next()?.parse().ok()?;
        let names_match = fields[0] == name || fields[2..].contains(&name);
        names_match.then_some(port)
    })
}

/// Lines look like `tcp  6  TCP  # transmission control protocol`.
fn find_protocol(db: &str, name: &str) -> Option<u8> {
    db_entries(db).find_map(|fields| {
        let number = fields.get(1)?.parse().ok()?;
        let names_match = fields[0] == name || fields[2..].contains(&name);
        names_match.then_some(number)
    })
}

fn db_entries(db: &str) -> impl Iterator<Item = Vec<&str>> {
    db.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|fields| fields.len() >= 2)
}
