use std::net::IpAddr;

use ip_network::IpNetwork;

use super::expr::{Comparator, FilterExpr, FilterValue, ValueKind};
use crate::format::layout::{IPV4_ADDR_LEN, IPV6_ADDR_LEN};
use crate::row::BinaryRow;

/// Filter evaluated directly on raw row bytes.
///
/// Numbers and addresses are pre-encoded in the row's byte order (big-endian)
/// so `==`/`!=`/`<=`/`>=` reduce to byte-string comparisons. Networks are
/// matched by shifting the row address right by the host-bit count and
/// comparing with the equally shifted network address.
#[derive(Debug, Clone)]
pub struct BinaryFilter {
    expr: FilterExpr,
    operand: Operand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Bytes(Vec<u8>),
    Network {
        addr_len: usize,
        shift: u32,
        reference: u128,
    },
}

impl BinaryFilter {
    pub fn new(expr: FilterExpr) -> Self {
        let operand = match &expr.value {
            FilterValue::Number(value) => Operand::Bytes(encode_number(expr.variable.kind(), *value)),
            FilterValue::Address(IpAddr::V4(addr)) => Operand::Bytes(addr.octets().to_vec()),
            FilterValue::Address(IpAddr::V6(addr)) => Operand::Bytes(addr.octets().to_vec()),
            FilterValue::Network(network) => network_operand(network),
        };
        Self { expr, operand }
    }

    pub fn expr(&self) -> &FilterExpr {
        &self.expr
    }

    pub fn matches(&self, row: &BinaryRow) -> bool {
        self.expr
            .variable
            .fields()
            .iter()
            .any(|field| self.test(row.field(*field)))
    }

    fn test(&self, actual: &[u8]) -> bool {
        let comparator = self.expr.comparator;
        match &self.operand {
            Operand::Bytes(expected) => {
                if actual.len() != expected.len() {
                    return comparator.incomparable();
                }
                comparator.holds(actual.cmp(expected.as_slice()))
            }
            Operand::Network {
                addr_len,
                shift,
                reference,
            } => {
                if actual.len() != *addr_len {
                    return comparator.incomparable();
                }
                let prefix = unpack_addr(actual).checked_shr(*shift).unwrap_or(0);
                let inside = prefix == *reference;
                match comparator {
                    Comparator::Ne => !inside,
                    _ => inside,
                }
            }
        }
    }
}

fn encode_number(kind: ValueKind, value: u32) -> Vec<u8> {
    match kind {
        ValueKind::L2Proto => vec![value as u8],
        _ => (value as u16).to_be_bytes().to_vec(),
    }
}

fn network_operand(network: &IpNetwork) -> Operand {
    let (addr_len, bits) = match network.network_address() {
        IpAddr::V4(_) => (IPV4_ADDR_LEN, 32),
        IpAddr::V6(_) => (IPV6_ADDR_LEN, 128),
    };
    let shift = bits - u32::from(network.netmask());
    let base = match network.network_address() {
        IpAddr::V4(addr) => unpack_addr(&addr.octets()),
        IpAddr::V6(addr) => unpack_addr(&addr.octets()),
    };
    Operand::Network {
        addr_len,
        shift,
        reference: base.checked_shr(shift).unwrap_or(0),
    }
}

/// Big-endian address bytes as an integer: 32 bits for IPv4, two 64-bit
/// halves for IPv6.
fn unpack_addr(bytes: &[u8]) -> u128 {
    match bytes.len() {
        IPV6_ADDR_LEN => {
            let mut high = [0u8; 8];
            let mut low = [0u8; 8];
            high.copy_from_slice(&bytes[..8]);
            low.copy_from_slice(&bytes[8..]);
            (u128::from(u64::from_be_bytes(high)) << 64) | u128::from(u64::from_be_bytes(low))
        }
        _ => {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[..IPV4_ADDR_LEN]);
            u128::from(u32::from_be_bytes(word))
        }
    }
}
