//! The nine-stage migration graph, its supervisor, and the runner that
//! drives a `WorkflowRun`'s `MigrationContext` from `init_project` through
//! `completed` (or `error`). See SPEC_FULL.md §4.

mod crosswalk;
mod error;
mod files;
mod process;
mod report_memory;
mod runner;
mod sql_runtime;
mod stages;
mod supervisor;

pub use crosswalk::{apply_crosswalk, load_crosswalk, parse_crosswalk_csv, SchemaMapping};
pub use error::{Result, WorkflowError};
pub use files::{list_sql_files, read_sql_files};
pub use process::{pty_echo, run_subprocess_with_echo, CommandOutput};
pub use report_memory::{build_report_context_memory, load_ignored_report_codes};
pub use runner::{resume, run, RunnerEvent};
pub use sql_runtime::{classify_snowflake_error, execute_sql_statements, split_sql_statements, SqlExecutionError};
pub use stages::{
    add_source_code::add_source_code, apply_schema_mapping::apply_schema_mapping,
    convert_code::convert_code, execute_sql::execute_sql, finalize::finalize,
    human_review::human_review, init_project::init_project, self_heal::self_heal,
    validate::validate,
};
pub use supervisor::{
    allowed_decisions, deterministic_fallback, invoke_supervisor, natural_proceed_target,
};
