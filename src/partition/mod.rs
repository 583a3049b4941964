//! Partition selector: user-supplied partition expressions resolved to
//! per-table partition-id prefixes and ordered name lists.
//!
//! Expressions come in three shapes:
//!
//! - a plain partition id (`20240101`), used as a prefix directly;
//! - a partition value tuple (`(2024,1)`), translated to its partition
//!   id by the database;
//! - either of the above qualified with a table (`db.table:20240101`),
//!   applying to that table only. Unqualified expressions apply to every
//!   selected table.
//!
//! The id prefixes filter part directories by name (a part belongs to a
//! partition iff its directory name starts with `<id>_`); the name lists
//! feed the `PARTITIONS 'x','y'` clause of engine-managed backups.

use std::collections::{BTreeMap, HashSet};

use crate::database::{DatabaseAdapter, DatabaseResult, Table, TableRef};

/// Resolved partition selection for a set of tables.
///
/// Tables with no entry (or an empty entry) are captured in full.
#[derive(Debug, Clone, Default)]
pub struct PartitionSelection {
    /// Original expressions per table, in user order, for engine
    /// `PARTITIONS` clauses.
    pub name_list: BTreeMap<TableRef, Vec<String>>,
    /// Resolved partition-id prefixes per table, for part-name filtering.
    pub id_map: BTreeMap<TableRef, HashSet<String>>,
}

impl PartitionSelection {
    /// Id prefixes for one table; empty set when the whole table is
    /// selected.
    pub fn prefixes_for(&self, table: &TableRef) -> HashSet<String> {
        self.id_map.get(table).cloned().unwrap_or_default()
    }

    /// Partition names for one table, for the engine statement.
    pub fn names_for(&self, table: &TableRef) -> &[String] {
        self.name_list
            .get(table)
            .map(|names| names.as_slice())
            .unwrap_or(&[])
    }
}

/// Resolves partition expressions against every table in the set.
///
/// An empty expression list selects all partitions of all tables. A
/// value tuple the database cannot translate for some table is dropped
/// for that table (the table may simply not have that partition); plain
/// ids are kept verbatim, even when no part of the table carries them.
pub fn resolve(
    adapter: &dyn DatabaseAdapter,
    tables: &[Table],
    expressions: &[String],
) -> DatabaseResult<PartitionSelection> {
    let mut selection = PartitionSelection::default();
    if expressions.is_empty() {
        return Ok(selection);
    }

    for table in tables {
        if table.skip {
            continue;
        }
        let table_ref = TableRef::for_table(table);
        let mut names: Vec<String> = Vec::new();
        let mut ids: HashSet<String> = HashSet::new();
        for expression in expressions {
            let expr = match split_qualifier(expression) {
                (Some((database, name)), expr) => {
                    if database != table.database || name != table.name {
                        continue;
                    }
                    expr
                }
                (None, expr) => expr,
            };

            let partition_id = if expr.starts_with('(') {
                adapter.resolve_partition_id(&table.database, &table.name, expr)?
            } else {
                Some(expr.to_string())
            };
            if let Some(partition_id) = partition_id {
                if !names.iter().any(|name| name == expr) {
                    names.push(expr.to_string());
                }
                ids.insert(partition_id);
            }
        }
        if !ids.is_empty() {
            selection.name_list.insert(table_ref.clone(), names);
            selection.id_map.insert(table_ref, ids);
        }
    }
    Ok(selection)
}

/// Splits an optional `db.table:` qualifier off an expression. Value
/// tuples are never treated as qualifiers.
fn split_qualifier(expression: &str) -> (Option<(&str, &str)>, &str) {
    if let Some((qualifier, rest)) = expression.split_once(':') {
        if !qualifier.starts_with('(') {
            if let Some((database, table)) = qualifier.split_once('.') {
                return (Some((database, table)), rest);
            }
        }
    }
    (None, expression)
}
