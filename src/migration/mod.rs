// ABOUTME: Migration engine module
// ABOUTME: Type mapping, schema introspection, DDL, data transfer, verification, and orchestration

pub mod ddl;
pub mod orchestrator;
pub mod profile;
pub mod schema;
pub mod transfer;
pub mod typemap;
pub mod verify;

pub use ddl::{create_tables, generate_create_table};
pub use orchestrator::{MigrationPhase, MigrationReport, MigrationResult, Orchestrator};
pub use profile::TargetProfile;
pub use schema::{describe_schema, ColumnDescriptor, SchemaDescriptor, TableDescriptor};
pub use transfer::{transfer, TransferStats};
pub use typemap::{TargetEngine, TypeMapper, TypeMapping};
pub use verify::{check_row_counts, compare_row_counts, count_rows, verify, RowCountResult};
