//! redb table definitions for the durable `KnowledgeStore` backend, grounded
//! in the teacher's `memory-storage-redb::lib` table layout (one
//! `TableDefinition<&str, &[u8]>` per logical collection, key is the
//! entity's UUID rendered as a string, value is a `postcard`-serialized
//! blob).

use redb::TableDefinition;

pub(crate) const SKILLS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("skills");
pub(crate) const EMBEDDINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");
pub(crate) const PREFERENCES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("preferences");
pub(crate) const RELATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("relations");
/// One entry per task-type, value is a postcard-serialized
/// `HashMap<String, serde_json::Value>` of that task-type's parameter
/// defaults.
pub(crate) const PARAMETER_DEFAULTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("parameter_defaults");
