//! Testing utilities for the converge workspace
//!
//! Shared fakes, fixtures, and helpers.

#![allow(missing_docs)]

mod remote;

pub use remote::{InMemoryRemote, Operation};

use converge_model::{
    ActionKind, FunctionClass, FunctionDefinition, FunctionKind, SchemaDefinition, SchemaFields,
};
use converge_scan::TreeWriter;
use std::path::Path;
use tempfile::TempDir;

pub fn qualification(name: &str, code: &str) -> FunctionDefinition {
    FunctionDefinition::new(name, FunctionClass::Qualification, code)
}

pub fn action(verb: ActionKind, code: &str) -> FunctionDefinition {
    FunctionDefinition::new(verb.as_str(), FunctionClass::Action { action_kind: verb }, code)
}

pub fn function(name: &str, kind: FunctionKind, code: &str) -> FunctionDefinition {
    FunctionDefinition::new(name, FunctionClass::classify(kind, name), code)
}

/// A schema with one qualification
pub fn create_test_schema(name: &str) -> SchemaDefinition {
    SchemaDefinition::new(SchemaFields::new(name, format!("// {name}\nfunction main() {{}}\n")))
        .with_function(qualification("qualify", "async function main() { return true; }"))
}

/// `count` distinct test schemas named `Schema0..`
pub fn create_test_schemas(count: usize) -> Vec<SchemaDefinition> {
    (0..count)
        .map(|i| create_test_schema(&format!("Schema{i}")))
        .collect()
}

/// Write schemas to `root` in the on-disk layout
pub async fn write_schema_tree(root: &Path, schemas: &[SchemaDefinition]) {
    let writer = TreeWriter::new(root).with_force(true);
    for schema in schemas {
        writer
            .write_schema(schema)
            .await
            .unwrap_or_else(|e| panic!("failed to write fixture {}: {e}", schema.name()));
    }
}

/// Temporary directory holding the given schemas
pub async fn setup_schema_tree(schemas: &[SchemaDefinition]) -> TempDir {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("failed to create temp dir: {e}"));
    write_schema_tree(dir.path(), schemas).await;
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_are_valid_and_distinct() {
        let schemas = create_test_schemas(3);
        assert_eq!(schemas.len(), 3);
        assert!(schemas.iter().all(|s| s.validate().is_ok()));
        assert_ne!(schemas[0].name(), schemas[1].name());
    }

    #[test]
    fn action_fixture_uses_verb_name() {
        let create = action(ActionKind::Create, "c");
        assert_eq!(create.name, "create");
        assert_eq!(create.action_kind(), Some(ActionKind::Create));
    }
}
