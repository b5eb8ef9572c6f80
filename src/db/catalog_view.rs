//! An in-memory view of the user tables in the catalog.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::TableProperty;

/// User tables by name, as one transaction sees them.
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    tables: BTreeMap<String, TableProperty>,
}

impl CatalogView {
    pub fn insert(&mut self, prop: TableProperty) {
        self.tables.insert(prop.name.clone(), prop);
    }

    pub fn get(&self, name: &str) -> Option<&TableProperty> {
        self.tables.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableProperty> {
        self.tables.values()
    }

    /// Every `(table, column index)` whose column references `target`.
    pub fn referencing<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = (&'a TableProperty, usize)> + 'a {
        self.tables.values().flat_map(move |prop| {
            prop.columns
                .iter()
                .enumerate()
                .filter(move |(_, col)| col.references.as_deref() == Some(target))
                .map(move |(i, _)| (prop, i))
        })
    }

    /// `name`, the tables it references and the tables referencing it.
    ///
    /// A write to `name` locks all of them.
    pub fn related(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::from([name.to_string()]);
        if let Some(prop) = self.get(name) {
            out.extend(prop.referencing.values().cloned());
        }
        out.extend(self.referencing(name).map(|(prop, _)| prop.name.clone()));
        out
    }
}
