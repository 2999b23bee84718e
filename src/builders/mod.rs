mod sql;

pub use sql::Sql;
