mod decode;
mod driver;
mod table;

pub use decode::{FromRow, FromSqlValue};
pub use driver::{Connector, DatabaseDriver};
pub use table::Table;
