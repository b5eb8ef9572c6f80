//! A table: schema checks over a B-link tree.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use crate::catalog::TableProperty;
use crate::common::{BlockNum, Result};
use crate::index::{BLinkTree, NodeLatches};
use crate::record::RecordStore;
use crate::tuple::Tuple;
use crate::txn::PageStore;

/// One table opened from its catalog property.
///
/// Tables are cheap to construct; the database builds one per operation
/// from the property its transaction sees.
pub struct Table {
    prop: TableProperty,
    tree: BLinkTree,
}

impl Table {
    pub fn new(prop: TableProperty, fill_limit: usize, latches: Arc<NodeLatches>) -> Self {
        let records = RecordStore::new(prop.name.clone(), prop.key_columns(), fill_limit);
        let tree = BLinkTree::new(prop.index_root, records, fill_limit, latches);
        Self { prop, tree }
    }

    pub fn property(&self) -> &TableProperty {
        &self.prop
    }

    pub fn name(&self) -> &str {
        &self.prop.name
    }

    pub fn key_of(&self, tuple: &Tuple) -> Tuple {
        self.prop.key_of(tuple)
    }

    /// Write the empty index and record roots.
    pub fn create(&self, store: &mut dyn PageStore) -> Result<()> {
        self.tree.init(store, self.prop.record_root)
    }

    pub fn insert(&self, store: &mut dyn PageStore, tuple: Tuple) -> Result<()> {
        self.prop.check_tuple(&tuple)?;
        let key = self.key_of(&tuple);
        self.tree.insert(store, &key, tuple)
    }

    /// Replace the row with `tuple`'s key.
    pub fn update(&self, store: &mut dyn PageStore, tuple: Tuple) -> Result<()> {
        self.prop.check_tuple(&tuple)?;
        let key = self.key_of(&tuple);
        self.tree.update(store, &key, tuple)
    }

    /// Insert or replace. Returns `true` if the row was new.
    pub fn upsert(&self, store: &mut dyn PageStore, tuple: Tuple) -> Result<bool> {
        self.prop.check_tuple(&tuple)?;
        let key = self.key_of(&tuple);
        self.tree.upsert(store, &key, tuple)
    }

    pub fn remove(&self, store: &mut dyn PageStore, key: &Tuple) -> Result<Tuple> {
        self.prop.check_key(key)?;
        self.tree.remove(store, key)
    }

    pub fn find(&self, store: &mut dyn PageStore, key: &Tuple) -> Result<Option<Tuple>> {
        self.prop.check_key(key)?;
        self.tree.find_key(store, key)
    }

    pub fn find_less(
        &self,
        store: &mut dyn PageStore,
        key: &Tuple,
        inclusive: bool,
    ) -> Result<Vec<Tuple>> {
        self.prop.check_bound(key)?;
        self.tree.find_less(store, key, inclusive)
    }

    pub fn find_greater(
        &self,
        store: &mut dyn PageStore,
        key: &Tuple,
        inclusive: bool,
    ) -> Result<Vec<Tuple>> {
        self.prop.check_bound(key)?;
        self.tree.find_greater(store, key, inclusive)
    }

    pub fn find_range(
        &self,
        store: &mut dyn PageStore,
        lo: Bound<&Tuple>,
        hi: Bound<&Tuple>,
    ) -> Result<Vec<Tuple>> {
        for bound in [lo, hi] {
            if let Bound::Included(key) | Bound::Excluded(key) = bound {
                self.prop.check_bound(key)?;
            }
        }
        self.tree.find_range(store, lo, hi)
    }

    pub fn scan(&self, store: &mut dyn PageStore) -> Result<Vec<Tuple>> {
        self.tree.scan(store)
    }

    /// Rows for which `pred` holds, in key order.
    pub fn find_where<P>(&self, store: &mut dyn PageStore, pred: P) -> Result<Vec<Tuple>>
    where
        P: Fn(&Tuple) -> Result<bool>,
    {
        let mut out = Vec::new();
        for tuple in self.tree.scan(store)? {
            if pred(&tuple)? {
                out.push(tuple);
            }
        }
        Ok(out)
    }

    /// Rows whose `column` equals `value`'s single element.
    pub fn find_by_column(
        &self,
        store: &mut dyn PageStore,
        column: usize,
        value: &Tuple,
    ) -> Result<Vec<Tuple>> {
        let Some(wanted) = value.get(0) else {
            return Ok(Vec::new());
        };
        self.find_where(store, |t| Ok(t.get(column) == Some(wanted)))
    }

    pub fn reachable_blocks(&self, store: &mut dyn PageStore) -> Result<BTreeSet<BlockNum>> {
        self.tree.reachable_blocks(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnProperty, TableSchema};
    use crate::common::Error;
    use crate::tuple;
    use crate::tuple::{ColumnType, Value};
    use crate::txn::page_store::testing::TestStore;

    fn setup() -> (TestStore, Table) {
        let ts = TestStore::new(32);
        let schema = TableSchema::new(
            "people",
            vec![
                ColumnProperty::new("id", ColumnType::Int).key(),
                ColumnProperty::new("name", ColumnType::varchar(16)).not_null(),
                ColumnProperty::new("age", ColumnType::Int),
            ],
        );
        let prop = TableProperty::new(
            schema,
            ts.allocator.new_block().unwrap(),
            ts.allocator.new_block().unwrap(),
        );
        let table = Table::new(prop, 64, Arc::new(NodeLatches::new()));
        (ts, table)
    }

    #[test]
    fn test_schema_checked_before_write() {
        let (mut ts, table) = setup();
        table.create(&mut ts.store).unwrap();

        assert!(matches!(
            table.insert(&mut ts.store, tuple![1, Value::Null, 3]),
            Err(Error::NotNullViolation { .. })
        ));
        assert!(matches!(
            table.insert(&mut ts.store, tuple![1, "ann"]),
            Err(Error::ArityMismatch { .. })
        ));
        assert!(table.scan(&mut ts.store).unwrap().is_empty());
    }

    #[test]
    fn test_crud() {
        let (mut ts, table) = setup();
        table.create(&mut ts.store).unwrap();
        for (id, name) in [(1, "ann"), (2, "bob"), (3, "cyd"), (4, "dee")] {
            table
                .insert(&mut ts.store, tuple![id, name, Value::Null])
                .unwrap();
        }

        table.update(&mut ts.store, tuple![2, "bob", 40]).unwrap();
        assert_eq!(
            table.find(&mut ts.store, &tuple![2]).unwrap(),
            Some(tuple![2, "bob", 40])
        );
        assert_eq!(
            table.remove(&mut ts.store, &tuple![1]).unwrap(),
            tuple![1, "ann", Value::Null]
        );
        assert!(table.upsert(&mut ts.store, tuple![5, "eve", 1]).unwrap());

        let names: Vec<_> = table
            .find_where(&mut ts.store, |t| Ok(t.values()[1] > Value::from("c")))
            .unwrap()
            .into_iter()
            .map(|t| t.values()[0].clone())
            .collect();
        assert_eq!(names, vec![Value::Int(3), Value::Int(4), Value::Int(5)]);

        assert_eq!(
            table
                .find_by_column(&mut ts.store, 2, &tuple![40])
                .unwrap(),
            vec![tuple![2, "bob", 40]]
        );
        assert_eq!(table.find_greater(&mut ts.store, &tuple![4], true).unwrap().len(), 2);
    }

    #[test]
    fn test_range_bounds_checked() {
        let (mut ts, table) = setup();
        table.create(&mut ts.store).unwrap();
        for id in 1..=5 {
            table
                .insert(&mut ts.store, tuple![id, "x", Value::Null])
                .unwrap();
        }

        let wide = tuple![Value::BigInt(3)];
        assert!(matches!(
            table.find_greater(&mut ts.store, &wide, false),
            Err(Error::TypeMismatch { left: "int", op: "store", right: "bigint" })
        ));
        assert!(table.find_less(&mut ts.store, &wide, false).unwrap_err().is_type_error());
        assert!(table
            .find_range(&mut ts.store, Bound::Unbounded, Bound::Included(&wide))
            .unwrap_err()
            .is_type_error());
        assert!(table
            .find_less(&mut ts.store, &tuple![Value::Null], true)
            .is_err());

        assert_eq!(table.find_less(&mut ts.store, &tuple![3], false).unwrap().len(), 2);
        let all = table
            .find_range(&mut ts.store, Bound::Unbounded, Bound::Unbounded)
            .unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_key_shape_checked() {
        let (mut ts, table) = setup();
        table.create(&mut ts.store).unwrap();
        assert!(table.find(&mut ts.store, &tuple!["1"]).unwrap_err().is_type_error());
    }
}
