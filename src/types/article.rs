use chrono::NaiveDateTime;

use crate::error::Result;
use crate::traits::{FromRow, Table};
use crate::types::Row;

/// A row of the `article` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub created_date: NaiveDateTime,
    pub modified_date: NaiveDateTime,
    blind: bool,
}

impl Article {
    pub fn new(
        id: i64,
        title: impl Into<String>,
        body: impl Into<String>,
        created_date: NaiveDateTime,
        modified_date: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            created_date,
            modified_date,
            blind: false,
        }
    }

    /// Whether the article is hidden from listings.
    /// Derived from an optional `is_blind` column; false when the query did not select it.
    pub fn is_blind(&self) -> bool {
        self.blind
    }
}

impl FromRow for Article {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            created_date: row.try_get("created_date")?,
            modified_date: row.try_get("modified_date")?,
            blind: row.get_as("is_blind").unwrap_or(false),
        })
    }
}

impl Table for Article {
    fn table_name() -> &'static str {
        "article"
    }

    fn create_sql() -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id BIGSERIAL PRIMARY KEY, \
             created_date TIMESTAMP NOT NULL, \
             modified_date TIMESTAMP NOT NULL, \
             title VARCHAR(100) NOT NULL, \
             body TEXT NOT NULL)",
            Self::qualified_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlValue;
    use chrono::NaiveDate;

    fn timestamp(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn columns(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_article_from_row() {
        let row = Row::new(
            &columns(&["id", "created_date", "modified_date", "title", "body"]),
            vec![
                SqlValue::Int(3),
                SqlValue::Timestamp(timestamp(1)),
                SqlValue::Timestamp(timestamp(2)),
                "title 3".into(),
                "body 3".into(),
            ],
        );

        let article = Article::from_row(&row).unwrap();
        assert_eq!(
            article,
            Article::new(3, "title 3", "body 3", timestamp(1), timestamp(2))
        );
        assert!(!article.is_blind());
    }

    #[test]
    fn test_article_blind_flag_from_numeric_column() {
        let row = Row::new(
            &columns(&["id", "title", "body", "created_date", "modified_date", "is_blind"]),
            vec![
                SqlValue::Int(1),
                "t".into(),
                "b".into(),
                "2024-05-01 09:00:00".into(),
                "2024-05-01 09:00:00".into(),
                SqlValue::Int(1),
            ],
        );

        let article = Article::from_row(&row).unwrap();
        assert!(article.is_blind());
        assert_eq!(article.created_date, timestamp(1));
    }

    #[test]
    fn test_article_from_row_missing_column() {
        let row = Row::new(&columns(&["id"]), vec![SqlValue::Int(1)]);
        assert!(Article::from_row(&row).is_err());
    }

    #[test]
    fn test_create_sql_is_idempotent_ddl() {
        let ddl = Article::create_sql();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS article ("));
        assert!(ddl.contains("id BIGSERIAL PRIMARY KEY"));
    }
}
