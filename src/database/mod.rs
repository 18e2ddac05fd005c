pub mod connector;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod supervisor;

pub use connector::{Connector, StoreConnector, StoreKind};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use store::{Condition, Document, DocumentStore, Filter, StoreError, ID_FIELD};
pub use supervisor::{ConnectionHandle, ConnectionState, ConnectionSupervisor, RetryPolicy};
