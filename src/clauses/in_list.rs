use crate::translation::placeholder_positions;
use crate::types::SqlValue;

/// A list-membership fragment whose single `?` token stands for a
/// variable-length list of values.
///
/// `"id IN (?)"` with three values renders as `"id IN (?, ?, ?)"`. A fragment
/// without a `?` gets the list appended: `"id IN"` renders as
/// `"id IN (?, ?, ?)"`. An empty list renders the token as `NULL`, a clause
/// that matches no row.
#[derive(Debug, Clone, PartialEq)]
pub struct InList {
    fragment: String,
    values: Vec<SqlValue>,
}

impl InList {
    pub fn new<I, V>(fragment: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Self {
            fragment: fragment.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds the SQL fragment and pushes the list values onto `params`.
    pub fn build_sql(&self, params: &mut Vec<SqlValue>) -> String {
        let list = if self.values.is_empty() {
            "NULL".to_string()
        } else {
            vec!["?"; self.values.len()].join(", ")
        };
        params.extend(self.values.iter().cloned());

        match placeholder_positions(&self.fragment).first() {
            Some(&pos) => format!(
                "{}{}{}",
                &self.fragment[..pos],
                list,
                &self.fragment[pos + 1..]
            ),
            None => format!("{} ({})", self.fragment.trim_end(), list),
        }
    }
}
