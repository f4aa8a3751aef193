// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::MapError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
}

impl FilterOperator {
    /// Parses the operator as typed in the filter dialog.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "=" => Some(FilterOperator::Eq),
            "!=" => Some(FilterOperator::NotEq),
            ">" => Some(FilterOperator::Gt),
            "<" => Some(FilterOperator::Lt),
            ">=" => Some(FilterOperator::Gte),
            "<=" => Some(FilterOperator::Lte),
            s if s.eq_ignore_ascii_case("like") => Some(FilterOperator::Like),
            _ => None,
        }
    }

    /// Operator code understood by the record query endpoint.
    pub fn code(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::NotEq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Lt => "lt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub column: String,
    pub operator: String,
    pub value: String,
}

impl RecordFilter {
    pub fn new(column: &str, operator: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
        }
    }

    /// Query pair `(column, "op.value")`, or `None` if the filter is incomplete
    /// or uses an unknown operator. Such filters are skipped, not rejected.
    pub fn to_query_pair(&self) -> Option<(String, String)> {
        let column = self.column.trim();
        if column.is_empty() {
            return None;
        }
        let op = FilterOperator::from_symbol(&self.operator)?;
        Some((column.to_string(), format!("{}.{}", op.code(), self.value)))
    }
}

/// Parses `column:operator:value`. The value may itself contain colons.
impl FromStr for RecordFilter {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(column), Some(operator), Some(value)) if !column.trim().is_empty() => {
                Ok(RecordFilter::new(column.trim(), operator.trim(), value))
            }
            _ => Err(MapError::InvalidInput(format!(
                "filter '{}' must look like column:operator:value",
                s
            ))),
        }
    }
}
