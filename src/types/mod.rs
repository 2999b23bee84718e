mod article;
mod row;
mod sql_value;

pub use article::Article;
pub use row::{QueryResult, RawQueryResult, Row};
pub use sql_value::SqlValue;
