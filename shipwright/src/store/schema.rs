//! Store schema.

pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_VERSION_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    version    INTEGER NOT NULL,
    updated_at TEXT    NOT NULL
);
";

const BUILDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS builds (
    id         TEXT PRIMARY KEY,
    image      TEXT NOT NULL,
    profile    TEXT NOT NULL,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_builds_image ON builds(image);
";

const LAYERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS layers (
    image      TEXT NOT NULL,
    position   INTEGER NOT NULL,
    name       TEXT NOT NULL,
    key        TEXT NOT NULL,
    parent     TEXT,
    build_id   TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (image, position)
);
";

const BOOTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS boots (
    id         TEXT PRIMARY KEY,
    image      TEXT NOT NULL,
    status     TEXT NOT NULL,
    pid        INTEGER,
    exit_code  INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_boots_image ON boots(image);
";

pub fn all_schemas() -> [&'static str; 4] {
    [SCHEMA_VERSION_TABLE, BUILDS_TABLE, LAYERS_TABLE, BOOTS_TABLE]
}
