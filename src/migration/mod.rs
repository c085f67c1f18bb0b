pub mod model;
pub mod store;

pub use model::{Migration, MigrationPattern, SchemaDiff, TableDiff};
pub use store::MigrationStore;
