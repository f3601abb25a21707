pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS project (
    id          TEXT PRIMARY KEY,
    unix_name   TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    trashed     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS media (
    id            TEXT PRIMARY KEY,
    unix_name     TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL UNIQUE,
    description   TEXT NOT NULL DEFAULT '',
    media_type    TEXT NOT NULL,
    duration_secs REAL,
    trashed       INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    modified_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS project_media (
    project_id TEXT NOT NULL REFERENCES project(id) ON DELETE CASCADE,
    media_id   TEXT NOT NULL REFERENCES media(id) ON DELETE CASCADE,
    PRIMARY KEY (project_id, media_id)
);

CREATE INDEX IF NOT EXISTS idx_project_media_media ON project_media(media_id);
"#;
