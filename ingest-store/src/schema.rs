use rusqlite::Connection;

// Throttle rates are percentages; the checks keep them within a u8.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS organizations (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    is_accepting_events INTEGER NOT NULL DEFAULT 1,
    event_throttle_rate INTEGER NOT NULL DEFAULT 0
        CHECK (event_throttle_rate BETWEEN 0 AND 100),
    scrub_ip_addresses INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL REFERENCES organizations (id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    scrub_ip_addresses INTEGER NOT NULL DEFAULT 1,
    event_throttle_rate INTEGER NOT NULL DEFAULT 0
        CHECK (event_throttle_rate BETWEEN 0 AND 100),
    first_event TEXT,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_projects_organization ON projects (organization_id);

CREATE TABLE IF NOT EXISTS project_keys (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
    public_key TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    search_vector TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_issues_project ON issues (project_id);
";

pub fn create(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
