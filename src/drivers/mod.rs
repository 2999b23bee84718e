mod in_memory_test;
mod tokio_postgres;

pub use self::in_memory_test::{
    InMemoryTestConnector, InMemoryTestDriver, InMemoryTestResponse, InMemoryTestResponseBuilder,
    RecordedQuery, StatementKind,
};
pub use self::tokio_postgres::{TokioPostgresConnector, TokioPostgresDriver};
