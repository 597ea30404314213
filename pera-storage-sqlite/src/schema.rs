//! SQL DDL for the episodic log's single table plus its indexed filter
//! columns (`spec.md` §4.1: state, session ID, date, performance band).
//! The full episode is kept as a JSON payload, matching the teacher's
//! `memory-storage-turso` column design of pairing indexed scalar columns
//! with a serialized blob for the rest of the record.

pub const CREATE_EPISODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS episodes (
    episode_id TEXT PRIMARY KEY NOT NULL,
    goal TEXT NOT NULL,
    session_id TEXT NOT NULL,
    global_state TEXT NOT NULL,
    performance_band TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    payload TEXT NOT NULL
)
"#;

pub const CREATE_STATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_episodes_state ON episodes(global_state)";

pub const CREATE_SESSION_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_episodes_session ON episodes(session_id)";

pub const CREATE_START_TIME_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_episodes_start_time ON episodes(start_time DESC)";

pub const CREATE_BAND_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_episodes_band ON episodes(performance_band)";
