//! Database schema constants.
//!
//! This module contains the SQL schema for the task queue, form definitions,
//! participants and the event log.

/// SQL schema for creating the todolist table (the shared task queue).
pub const CREATE_TODOLIST_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS todolist (
    id UUID PRIMARY KEY,
    proc_inst_id VARCHAR(255),
    activity_name TEXT NOT NULL DEFAULT '',
    tool TEXT NOT NULL DEFAULT '',
    user_id TEXT NOT NULL DEFAULT '',
    tenant_id VARCHAR(255) NOT NULL DEFAULT '',
    draft_status VARCHAR(32) NOT NULL DEFAULT 'PENDING',
    consumer VARCHAR(255),
    feedback JSONB,
    draft JSONB,
    output JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// SQL schema for creating the form_def table.
pub const CREATE_FORM_DEF_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS form_def (
    id VARCHAR(255) NOT NULL,
    tenant_id VARCHAR(255) NOT NULL,
    fields_json JSONB,
    html TEXT,
    PRIMARY KEY (id, tenant_id)
)
"#;

/// SQL schema for creating the users table (people and agents).
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id VARCHAR(255) PRIMARY KEY,
    email VARCHAR(255),
    username VARCHAR(255),
    role TEXT,
    goal TEXT,
    persona TEXT,
    tools TEXT,
    profile TEXT,
    model VARCHAR(255),
    tenant_id VARCHAR(255),
    is_agent BOOLEAN NOT NULL DEFAULT FALSE
)
"#;

/// SQL schema for creating the events table.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id UUID PRIMARY KEY,
    job_id VARCHAR(255) NOT NULL,
    todo_id VARCHAR(255),
    proc_inst_id VARCHAR(255),
    event_type VARCHAR(64) NOT NULL,
    crew_type VARCHAR(64) NOT NULL,
    data JSONB NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Index for lease lookups.
pub const CREATE_TODOLIST_LEASE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_todolist_lease ON todolist(draft_status, updated_at)
WHERE consumer IS NULL
"#;

/// Index for prior-output lookups.
pub const CREATE_TODOLIST_PROC_INST_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_todolist_proc_inst_id ON todolist(proc_inst_id)
"#;

/// Index for event timelines.
pub const CREATE_EVENTS_TODO_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_todo_id ON events(todo_id, timestamp)
"#;

/// Index for participant lookup by e-mail.
pub const CREATE_USERS_EMAIL_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)
"#;

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_TODOLIST_TABLE,
        CREATE_FORM_DEF_TABLE,
        CREATE_USERS_TABLE,
        CREATE_EVENTS_TABLE,
        CREATE_TODOLIST_LEASE_INDEX,
        CREATE_TODOLIST_PROC_INST_INDEX,
        CREATE_EVENTS_TODO_INDEX,
        CREATE_USERS_EMAIL_INDEX,
    ]
}
