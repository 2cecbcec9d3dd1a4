pub mod add_source_code;
pub mod apply_schema_mapping;
pub mod convert_code;
pub mod execute_sql;
pub mod finalize;
pub mod human_review;
pub mod init_project;
pub mod self_heal;
pub mod validate;
