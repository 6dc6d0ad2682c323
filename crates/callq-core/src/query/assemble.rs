//! Module: query::assemble
//! Responsibility: render compiled fragments into one SQL statement.
//! Does not own: deciding which fragments exist.
//! Boundary: pure string assembly; never allocates parameters.

use std::fmt::Write as _;

///
/// Cte
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Cte {
    pub(crate) name: String,
    pub(crate) body: String,
}

impl Cte {
    pub(crate) fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

///
/// SelectQuery
///
/// One SELECT with optional leading CTEs. Empty clause lists are omitted.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct SelectQuery {
    pub(crate) ctes: Vec<Cte>,
    pub(crate) columns: Vec<String>,
    pub(crate) from: String,
    pub(crate) joins: Vec<String>,
    pub(crate) where_: Vec<String>,
    pub(crate) group_by: Option<String>,
    pub(crate) having: Vec<String>,
    pub(crate) order_by: Vec<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
}

impl SelectQuery {
    pub(crate) fn from_source(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            ..Self::default()
        }
    }

    /// Move every CTE out of `self`, leaving the bare SELECT behind.
    pub(crate) fn take_ctes(&mut self) -> Vec<Cte> {
        std::mem::take(&mut self.ctes)
    }

    pub(crate) fn render(&self) -> String {
        let mut sql = render_ctes(&self.ctes);

        let _ = write!(sql, "SELECT {}", self.columns.join(", "));
        let _ = write!(sql, "\nFROM {}", self.from);
        for join in &self.joins {
            let _ = write!(sql, "\n{join}");
        }
        if !self.where_.is_empty() {
            let _ = write!(sql, "\nWHERE {}", self.where_.join(" AND "));
        }
        if let Some(group_by) = &self.group_by {
            let _ = write!(sql, "\nGROUP BY {group_by}");
        }
        if !self.having.is_empty() {
            let _ = write!(sql, "\nHAVING {}", self.having.join(" AND "));
        }
        if !self.order_by.is_empty() {
            let _ = write!(sql, "\nORDER BY {}", self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, "\nLIMIT {limit}");
        }
        if let Some(offset) = self.offset {
            let _ = write!(sql, "\nOFFSET {offset}");
        }

        sql
    }
}

fn render_ctes(ctes: &[Cte]) -> String {
    if ctes.is_empty() {
        return String::new();
    }

    let rendered: Vec<String> = ctes
        .iter()
        .map(|cte| format!("{} AS (\n{}\n)", cte.name, cte.body))
        .collect();

    format!("WITH {}\n", rendered.join(",\n"))
}

/// `(a) UNION ALL (b) ...`
pub(crate) fn union_all(parts: &[String]) -> String {
    parts
        .iter()
        .map(|part| format!("({part})"))
        .collect::<Vec<_>>()
        .join("\nUNION ALL\n")
}

/// AND of `parts`; `None` when empty.
pub(crate) fn and_all(parts: Vec<String>) -> Option<String> {
    join_bool(parts, " AND ")
}

/// OR of `parts`; `None` when empty.
pub(crate) fn or_all(parts: Vec<String>) -> Option<String> {
    join_bool(parts, " OR ")
}

fn join_bool(mut parts: Vec<String>, sep: &str) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(format!("({})", parts.join(sep))),
    }
}

/// Alias safe to emit unquoted, else backtick-quoted.
pub(crate) fn alias(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "\\`"))
    }
}
