use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ip_network::IpNetwork;

use super::error::FilterError;
use super::names;
use crate::format::layout::RowField;

/// The closed set of row variables a filter may test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Host,
    SrcHost,
    DstHost,
    Port,
    SrcPort,
    DstPort,
    EthType,
    L2Proto,
}

/// What kind of value a variable holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Host,
    Port,
    EthType,
    L2Proto,
}

impl Variable {
    pub const ALL: [Variable; 8] = [
        Variable::Host,
        Variable::SrcHost,
        Variable::DstHost,
        Variable::Port,
        Variable::SrcPort,
        Variable::DstPort,
        Variable::EthType,
        Variable::L2Proto,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variable::Host => "host",
            Variable::SrcHost => "src_host",
            Variable::DstHost => "dst_host",
            Variable::Port => "port",
            Variable::SrcPort => "src_port",
            Variable::DstPort => "dst_port",
            Variable::EthType => "eth_type",
            Variable::L2Proto => "l2_proto",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|variable| variable.name() == name)
    }

    /// Row fields tested by this variable; wildcards test either field.
    pub fn fields(self) -> &'static [RowField] {
        match self {
            Variable::Host => &[RowField::SrcHost, RowField::DstHost],
            Variable::SrcHost => &[RowField::SrcHost],
            Variable::DstHost => &[RowField::DstHost],
            Variable::Port => &[RowField::SrcPort, RowField::DstPort],
            Variable::SrcPort => &[RowField::SrcPort],
            Variable::DstPort => &[RowField::DstPort],
            Variable::EthType => &[RowField::EtherType],
            Variable::L2Proto => &[RowField::L2Proto],
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Variable::Host | Variable::SrcHost | Variable::DstHost => ValueKind::Host,
            Variable::Port | Variable::SrcPort | Variable::DstPort => ValueKind::Port,
            Variable::EthType => ValueKind::EthType,
            Variable::L2Proto => ValueKind::L2Proto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Le,
    Ge,
}

impl Comparator {
    const ALL: [Comparator; 4] = [Comparator::Eq, Comparator::Ne, Comparator::Le, Comparator::Ge];

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Le => "<=",
            Comparator::Ge => ">=",
        }
    }

    /// Whether `actual <op> expected` holds, given `actual.cmp(expected)`.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Ne => ordering != Ordering::Equal,
            Comparator::Le => ordering != Ordering::Greater,
            Comparator::Ge => ordering != Ordering::Less,
        }
    }

    /// Outcome when the operands cannot be compared (different address
    /// families): only `!=` holds.
    pub fn incomparable(self) -> bool {
        self == Comparator::Ne
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Port, EtherType or protocol number, range-checked for its variable.
    Number(u32),
    Address(IpAddr),
    Network(IpNetwork),
}

/// One parsed `<variable><comparator><value>` atom.
///
/// # Examples
/// ```
/// use pichi_core::filter::{Comparator, FilterExpr, FilterValue, Variable};
///
/// let expr: FilterExpr = "dst_port>=1024".parse()?;
/// assert_eq!(expr.variable, Variable::DstPort);
/// assert_eq!(expr.comparator, Comparator::Ge);
/// assert_eq!(expr.value, FilterValue::Number(1024));
/// # Ok::<(), pichi_core::FilterError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpr {
    pub variable: Variable,
    pub comparator: Comparator,
    pub value: FilterValue,
}

impl FilterExpr {
    /// Parse a whitespace-separated list of atoms.
    pub fn parse_list(expression: &str) -> Result<Vec<FilterExpr>, FilterError> {
        expression.split_whitespace().map(str::parse).collect()
    }
}

impl FromStr for FilterExpr {
    type Err = FilterError;

    fn from_str(atom: &str) -> Result<Self, Self::Err> {
        let malformed = || FilterError::Malformed {
            atom: atom.to_string(),
        };
        let (at, comparator) = (0..atom.len())
            .filter(|i| atom.is_char_boundary(*i))
            .find_map(|i| {
                Comparator::ALL
                    .into_iter()
                    .find(|c| atom[i..].starts_with(c.symbol()))
                    .map(|c| (i, c))
            })
            .ok_or_else(malformed)?;
        let name = &atom[..at];
        let raw_value = &atom[at + comparator.symbol().len()..];
        if name.is_empty() || raw_value.is_empty() {
            return Err(malformed());
        }
        let variable = Variable::from_name(name).ok_or_else(|| FilterError::UnknownVariable {
            name: name.to_string(),
        })?;
        let value = parse_value(variable, comparator, raw_value)?;
        Ok(FilterExpr {
            variable,
            comparator,
            value,
        })
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.variable.name(), self.comparator.symbol())?;
        match &self.value {
            FilterValue::Number(value) => write!(f, "{value}"),
            FilterValue::Address(addr) => write!(f, "{addr}"),
            FilterValue::Network(net) => write!(f, "{net}"),
        }
    }
}

fn parse_value(
    variable: Variable,
    comparator: Comparator,
    raw: &str,
) -> Result<FilterValue, FilterError> {
    match variable.kind() {
        ValueKind::Host => parse_host(comparator, raw),
        ValueKind::Port => {
            let port = if is_numeric(raw) {
                parse_number(variable, raw, u64::from(u16::MAX))?
            } else {
                u32::from(names::lookup_service(raw)?)
            };
            Ok(FilterValue::Number(port))
        }
        ValueKind::L2Proto => {
            let proto = if is_numeric(raw) {
                parse_number(variable, raw, u64::from(u8::MAX))?
            } else {
                u32::from(names::lookup_protocol(raw)?)
            };
            Ok(FilterValue::Number(proto))
        }
        ValueKind::EthType => Ok(FilterValue::Number(parse_number(
            variable,
            raw,
            u64::from(u16::MAX),
        )?)),
    }
}

fn parse_host(comparator: Comparator, raw: &str) -> Result<FilterValue, FilterError> {
    if raw.contains('/') {
        if !matches!(comparator, Comparator::Eq | Comparator::Ne) {
            return Err(FilterError::NetworkComparator {
                comparator: comparator.symbol(),
            });
        }
        let network = IpNetwork::from_str(raw).map_err(|err| FilterError::InvalidNetwork {
            value: raw.to_string(),
            message: err.to_string(),
        })?;
        return Ok(FilterValue::Network(network));
    }
    let invalid = || FilterError::InvalidAddress {
        value: raw.to_string(),
    };
    let addr = if raw.contains(':') {
        IpAddr::V6(raw.parse::<Ipv6Addr>().map_err(|_| invalid())?)
    } else if raw.chars().any(|c| c.is_ascii_alphabetic()) {
        names::resolve_host(raw)?
    } else {
        IpAddr::V4(raw.parse::<Ipv4Addr>().map_err(|_| invalid())?)
    };
    Ok(FilterValue::Address(addr))
}

/// Numeric literals are parsed as numbers, anything else as a name.
fn is_numeric(raw: &str) -> bool {
    raw.starts_with("0x") || raw.starts_with("0X") || raw.bytes().all(|b| b.is_ascii_digit())
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_number(variable: Variable, raw: &str, max: u64) -> Result<u32, FilterError> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    let value = parsed.map_err(|_| FilterError::InvalidNumber {
        variable: variable.name(),
        value: raw.to_string(),
    })?;
    if value > max {
        return Err(FilterError::OutOfRange {
            variable: variable.name(),
            value,
        });
    }
    u32::try_from(value).map_err(|_| FilterError::OutOfRange {
        variable: variable.name(),
        value,
    })
}
