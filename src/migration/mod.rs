// ABOUTME: Schema repair and cross-engine migration pipelines
// ABOUTME: Table catalog, value normalization, SQL dialects and the Store abstraction

pub mod catalog;
pub mod migrator;
pub mod repair;
pub mod report;
pub mod sql;
pub mod store;
pub mod value;

pub use catalog::{
    default_catalog, find_table, validate_dependency_order, ColumnDef, ColumnType, ForeignKey,
    TableSpec, LEGACY_COLUMN, LEGACY_TABLE,
};
pub use migrator::MigrationRun;
pub use repair::{repair_table, RepairOutcome, RepairPlan, RepairStage};
pub use report::{MigrationReport, TableReport};
pub use sql::Dialect;
pub use store::{ColumnDescriptor, Store};
pub use value::{normalize, Row, SqlValue};
