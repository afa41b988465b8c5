use std::net::IpAddr;

use super::expr::{Comparator, FilterExpr, FilterValue};
use crate::format::layout::RowField;
use crate::row::TextRow;

/// Filter evaluated against decoded row values.
#[derive(Debug, Clone)]
pub struct TextFilter {
    expr: FilterExpr,
}

enum Decoded {
    Host(IpAddr),
    Number(u32),
}

impl TextFilter {
    pub fn new(expr: FilterExpr) -> Self {
        Self { expr }
    }

    pub fn expr(&self) -> &FilterExpr {
        &self.expr
    }

    pub fn matches(&self, row: &TextRow) -> bool {
        self.expr
            .variable
            .fields()
            .iter()
            .any(|field| self.test(decode(row, *field)))
    }

    fn test(&self, actual: Decoded) -> bool {
        let comparator = self.expr.comparator;
        match (actual, &self.expr.value) {
            (Decoded::Number(actual), FilterValue::Number(expected)) => {
                comparator.holds(actual.cmp(expected))
            }
            (Decoded::Host(actual), FilterValue::Address(expected)) => {
                if actual.is_ipv4() != expected.is_ipv4() {
                    return comparator.incomparable();
                }
                comparator.holds(actual.cmp(expected))
            }
            (Decoded::Host(actual), FilterValue::Network(network)) => {
                let inside = network.contains(actual);
                match comparator {
                    Comparator::Ne => !inside,
                    _ => inside,
                }
            }
            _ => comparator.incomparable(),
        }
    }
}

fn decode(row: &TextRow, field: RowField) -> Decoded {
    match field {
        RowField::SrcHost => Decoded::Host(row.src_host()),
        RowField::DstHost => Decoded::Host(row.dst_host()),
        RowField::SrcPort => Decoded::Number(u32::from(row.src_port())),
        RowField::DstPort => Decoded::Number(u32::from(row.dst_port())),
        RowField::EtherType => Decoded::Number(u32::from(row.ether_type())),
        RowField::L2Proto => Decoded::Number(u32::from(row.l2_proto())),
        RowField::Seconds => Decoded::Number(row.record().timestamp.seconds),
        RowField::Micros => Decoded::Number(row.record().timestamp.micros),
        RowField::Start | RowField::Stop => Decoded::Number(0),
    }
}
