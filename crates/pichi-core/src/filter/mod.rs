//! Filter expressions and their compiled matchers.
//!
//! An expression is a whitespace-separated conjunction of atoms of the form
//! `<variable><comparator><value>`, for example
//! `src_host==10.0.0.0/8 dst_port<=1024`. Atoms are parsed once into
//! `FilterExpr`s, then compiled for the row representation of the index being
//! read: `TextFilter` compares decoded values, `BinaryFilter` compares raw
//! bytes. Both give the same answer for the same row.

pub mod binary;
pub mod error;
pub mod expr;
mod names;
pub mod text;

use std::net::IpAddr;

pub use binary::BinaryFilter;
pub use error::FilterError;
pub use expr::{Comparator, FilterExpr, FilterValue, ValueKind, Variable};
pub use text::TextFilter;

use crate::format::IndexFormat;
use crate::row::Row;

/// One compiled filter.
#[derive(Debug, Clone)]
pub enum Filter {
    Text(TextFilter),
    Binary(BinaryFilter),
}

impl Filter {
    pub fn compile(expr: FilterExpr, format: IndexFormat) -> Self {
        match format {
            IndexFormat::Text => Filter::Text(TextFilter::new(expr)),
            IndexFormat::Binary => Filter::Binary(BinaryFilter::new(expr)),
        }
    }

    pub fn expr(&self) -> &FilterExpr {
        match self {
            Filter::Text(filter) => filter.expr(),
            Filter::Binary(filter) => filter.expr(),
        }
    }

    /// Evaluate against a row; a row of the other representation is
    /// converted first.
    pub fn matches(&self, row: &Row) -> bool {
        match (self, row) {
            (Filter::Text(filter), Row::Text(row)) => filter.matches(row),
            (Filter::Binary(filter), Row::Binary(row)) => filter.matches(row),
            (Filter::Text(filter), Row::Binary(row)) => {
                row.to_text().is_ok_and(|row| filter.matches(&row))
            }
            (Filter::Binary(filter), Row::Text(row)) => {
                row.to_binary().is_ok_and(|row| filter.matches(&row))
            }
        }
    }
}

/// Ordered conjunction of filters; an empty set matches every row.
///
/// # Examples
/// ```
/// use pichi_core::{BinaryRow, FilterSet, IndexFormat, Row};
///
/// let filters = FilterSet::parse("port==80 src_host==10.0.0.0/8", IndexFormat::Binary)?;
/// let row = BinaryRow::from_text("1.0|a.pcap|24|100|2048|6|10.0.0.1|10.0.0.2|1000|80")
///     .expect("row");
/// assert!(filters.matches(&Row::Binary(row)));
/// # Ok::<(), pichi_core::FilterError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn parse(expression: &str, format: IndexFormat) -> Result<Self, FilterError> {
        Ok(Self::compile(FilterExpr::parse_list(expression)?, format))
    }

    pub fn compile(exprs: Vec<FilterExpr>, format: IndexFormat) -> Self {
        Self {
            filters: exprs
                .into_iter()
                .map(|expr| Filter::compile(expr, format))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Filters are evaluated in order, stopping at the first failure.
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }

    /// Addresses every matching row must carry (host equality atoms).
    pub fn required_hosts(&self) -> Vec<IpAddr> {
        required_hosts(self.filters.iter().map(Filter::expr))
    }
}

pub(crate) fn required_hosts<'a>(exprs: impl Iterator<Item = &'a FilterExpr>) -> Vec<IpAddr> {
    exprs
        .filter(|expr| {
            expr.variable.kind() == ValueKind::Host && expr.comparator == Comparator::Eq
        })
        .filter_map(|expr| match expr.value {
            FilterValue::Address(addr) => Some(addr),
            _ => None,
        })
        .collect()
}
