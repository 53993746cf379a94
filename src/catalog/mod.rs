use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::{
    errors::{DbError, Result},
    storage::{disk::manager::DbFile, page::page::TableId},
};

/// Maps table identifiers to the files that store them.
#[derive(Default)]
pub struct Catalog {
    files: DashMap<TableId, Arc<dyn DbFile>>,
    names: DashMap<String, TableId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` under `name`. A table with the same name or id is replaced.
    pub fn add_table(&self, name: impl Into<String>, file: Arc<dyn DbFile>) -> TableId {
        let name = name.into();
        let table_id = file.table_id();

        // Drop the name previously bound to this id
        self.names.retain(|_, id| *id != table_id);

        info!(table = table_id, name = %name, "registered table");
        self.names.insert(name, table_id);
        self.files.insert(table_id, file);

        table_id
    }

    pub fn get_database_file(&self, table_id: TableId) -> Result<Arc<dyn DbFile>> {
        self.files
            .get(&table_id)
            .map(|file| Arc::clone(file.value()))
            .ok_or(DbError::NoSuchTable { table: table_id })
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).map(|id| *id.value())
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.files.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}
