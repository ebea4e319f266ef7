//! In-memory database backend.
//!
//! Deterministic and test-friendly. It enforces primary keys, unique
//! indexes and parent/child tables with cascading deletes, and evaluates
//! structured selects. Raw SQL statements are only answered when a
//! [`RawHandler`] is installed.
//!
//! A transaction holds the database lock from `begin` until commit or
//! rollback, so transactions are trivially serializable. Each commit builds
//! the next state from a copy and swaps it in only when every mutation
//! succeeded.

use super::{Database, DbError, DbResult, Transaction};
use async_trait::async_trait;
use featuredb_engine::{
    CmpOp, Direction, Mutation, MutationKind, Predicate, Row, Select, Statement, Value,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};

/// Answers raw SQL statements for the in-memory backend.
pub type RawHandler =
    Arc<dyn Fn(&str, &BTreeMap<String, Value>) -> DbResult<Vec<Row>> + Send + Sync>;

/// Declares a table for the in-memory backend.
#[derive(Debug, Clone)]
pub struct TableDef {
    name: String,
    primary_key: Vec<String>,
    unique: Vec<Vec<String>>,
    parents: Vec<ParentRef>,
}

/// Interleaving of a child table under its parent.
///
/// Each pair maps a child column to the parent primary key column it
/// references, in parent primary key order. Deleting a parent row deletes
/// its children.
#[derive(Debug, Clone)]
struct ParentRef {
    table: String,
    columns: Vec<(String, String)>,
}

impl TableDef {
    pub fn new(name: &str, primary_key: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
            unique: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Add a unique index. Rows with a NULL in an indexed column are exempt.
    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Make this table a child of `parent`. A table may have several
    /// parents; deleting any of them deletes the child row.
    pub fn child_of(mut self, parent: &str, columns: &[(&str, &str)]) -> Self {
        self.parents.push(ParentRef {
            table: parent.to_string(),
            columns: columns
                .iter()
                .map(|(child, parent)| (child.to_string(), parent.to_string()))
                .collect(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn encode_key(values: &[Value]) -> DbResult<String> {
    serde_json::to_string(values)
        .map_err(|e| DbError::Engine(featuredb_engine::Error::Serialization(e.to_string())))
}

#[derive(Debug, Clone)]
struct MemTable {
    def: Arc<TableDef>,
    rows: BTreeMap<String, Row>,
    /// One map per unique index: encoded values to encoded primary key.
    unique: Vec<HashMap<String, String>>,
}

impl MemTable {
    fn new(def: TableDef) -> Self {
        let unique = vec![HashMap::new(); def.unique.len()];
        Self {
            def: Arc::new(def),
            rows: BTreeMap::new(),
            unique,
        }
    }

    fn primary_key(&self, row: &Row) -> DbResult<String> {
        if let Some(missing) = self.def.primary_key.iter().find(|c| !row.contains(c)) {
            return Err(DbError::Constraint(format!(
                "{} row is missing primary key column {}",
                self.def.name, missing
            )));
        }
        encode_key(&row.values_of(&self.def.primary_key))
    }

    /// Encoded unique index entries for a row, skipping entries with NULLs.
    fn unique_entries(&self, row: &Row) -> DbResult<Vec<Option<String>>> {
        self.def
            .unique
            .iter()
            .map(|columns| {
                let values = row.values_of(columns);
                if values.iter().any(Value::is_null) {
                    Ok(None)
                } else {
                    encode_key(&values).map(Some)
                }
            })
            .collect()
    }

    fn put(&mut self, pk: String, row: Row) -> DbResult<()> {
        let entries = self.unique_entries(&row)?;
        for (index, entry) in self.unique.iter().zip(&entries) {
            if let Some(entry) = entry {
                if index.get(entry).is_some_and(|owner| *owner != pk) {
                    return Err(DbError::AlreadyExists {
                        table: self.def.name.clone(),
                    });
                }
            }
        }

        if let Some(old) = self.rows.remove(&pk) {
            self.unindex(&old)?;
        }
        for (index, entry) in self.unique.iter_mut().zip(entries) {
            if let Some(entry) = entry {
                index.insert(entry, pk.clone());
            }
        }
        self.rows.insert(pk, row);
        Ok(())
    }

    fn unindex(&mut self, row: &Row) -> DbResult<()> {
        let entries = self.unique_entries(row)?;
        for (index, entry) in self.unique.iter_mut().zip(entries) {
            if let Some(entry) = entry {
                index.remove(&entry);
            }
        }
        Ok(())
    }

    /// Primary keys of rows whose `columns` equal the values in `key`.
    fn matching(&self, key: &Row) -> DbResult<Vec<String>> {
        let columns: Vec<&String> = key.column_names().collect();
        let mut sorted_pk: Vec<&String> = self.def.primary_key.iter().collect();
        sorted_pk.sort();
        if columns == sorted_pk {
            let pk = self.primary_key(key)?;
            return Ok(self.rows.contains_key(&pk).then_some(pk).into_iter().collect());
        }

        for (position, index_columns) in self.def.unique.iter().enumerate() {
            let mut sorted: Vec<&String> = index_columns.iter().collect();
            sorted.sort();
            if columns == sorted {
                let entry = encode_key(&key.values_of(index_columns))?;
                return Ok(self.unique[position].get(&entry).cloned().into_iter().collect());
            }
        }

        Ok(self
            .rows
            .iter()
            .filter(|(_, row)| {
                key.columns().all(|(column, value)| {
                    row_value(row, column).compare(value) == Some(Ordering::Equal)
                })
            })
            .map(|(pk, _)| pk.clone())
            .collect())
    }
}

fn row_value<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: BTreeMap<String, MemTable>,
    commits: u64,
}

impl State {
    fn table(&self, name: &str) -> DbResult<&MemTable> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> DbResult<&mut MemTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    /// Apply one mutation. Returns the number of rows it touched,
    /// cascaded deletes included.
    fn apply(&mut self, mutation: &Mutation) -> DbResult<usize> {
        let name = mutation.table();
        let row = mutation.row();
        match mutation.kind() {
            MutationKind::Insert => {
                self.check_parent(name, row)?;
                let table = self.table_mut(name)?;
                let pk = table.primary_key(row)?;
                if table.rows.contains_key(&pk) {
                    return Err(DbError::AlreadyExists {
                        table: name.to_string(),
                    });
                }
                table.put(pk, row.clone())?;
                Ok(1)
            }
            MutationKind::Update => {
                let table = self.table_mut(name)?;
                let pk = table.primary_key(row)?;
                let mut merged = table
                    .rows
                    .get(&pk)
                    .cloned()
                    .ok_or_else(|| DbError::NotFound {
                        table: name.to_string(),
                    })?;
                merged.merge_from(row);
                table.put(pk, merged)?;
                Ok(1)
            }
            MutationKind::InsertOrUpdate => {
                let existing = {
                    let table = self.table(name)?;
                    let pk = table.primary_key(row)?;
                    table.rows.get(&pk).cloned().map(|r| (pk, r))
                };
                match existing {
                    Some((pk, mut merged)) => {
                        merged.merge_from(row);
                        self.table_mut(name)?.put(pk, merged)?;
                    }
                    None => {
                        self.check_parent(name, row)?;
                        let table = self.table_mut(name)?;
                        let pk = table.primary_key(row)?;
                        table.put(pk, row.clone())?;
                    }
                }
                Ok(1)
            }
            MutationKind::Delete => {
                let pks = self.table(name)?.matching(row)?;
                let mut touched = 0;
                for pk in pks {
                    touched += self.delete_cascade(name, &pk)?;
                }
                Ok(touched)
            }
        }
    }

    fn check_parent(&self, name: &str, row: &Row) -> DbResult<()> {
        let def = self.table(name)?.def.clone();
        for parent in &def.parents {
            let values: Vec<Value> = parent
                .columns
                .iter()
                .map(|(child, _)| row_value(row, child).clone())
                .collect();
            let key = encode_key(&values)?;
            if !self.table(&parent.table)?.rows.contains_key(&key) {
                return Err(DbError::Constraint(format!(
                    "{} row references missing {} row",
                    name, parent.table
                )));
            }
        }
        Ok(())
    }

    fn delete_cascade(&mut self, name: &str, pk: &str) -> DbResult<usize> {
        let removed = {
            let table = self.table_mut(name)?;
            match table.rows.remove(pk) {
                Some(row) => {
                    table.unindex(&row)?;
                    row
                }
                None => return Ok(0),
            }
        };

        let children: Vec<(String, Vec<(String, String)>)> = self
            .tables
            .values()
            .flat_map(|t| {
                t.def
                    .parents
                    .iter()
                    .filter(move |parent| parent.table == name)
                    .map(move |parent| (t.def.name.clone(), parent.columns.clone()))
            })
            .collect();

        let mut touched = 1;
        for (child, columns) in children {
            let child_pks: Vec<String> = self
                .table(&child)?
                .rows
                .iter()
                .filter(|(_, row)| {
                    columns.iter().all(|(child_col, parent_col)| {
                        row_value(row, child_col).compare(row_value(&removed, parent_col))
                            == Some(Ordering::Equal)
                    })
                })
                .map(|(pk, _)| pk.clone())
                .collect();
            for child_pk in child_pks {
                touched += self.delete_cascade(&child, &child_pk)?;
            }
        }
        Ok(touched)
    }

    fn commit(
        &mut self,
        mutations: &[Mutation],
        mutation_limit: Option<usize>,
        fail_after: Option<u64>,
    ) -> DbResult<()> {
        if mutations.is_empty() {
            return Ok(());
        }
        if let Some(limit) = fail_after {
            if self.commits >= limit {
                return Err(DbError::Unavailable(format!(
                    "commits disabled after {}",
                    limit
                )));
            }
        }

        let mut next = self.clone();
        let mut touched = 0;
        for mutation in mutations {
            touched += next.apply(mutation)?;
        }
        if let Some(limit) = mutation_limit {
            if touched > limit {
                return Err(DbError::MutationLimitExceeded {
                    count: touched,
                    limit,
                });
            }
        }

        self.tables = next.tables;
        self.commits += 1;
        Ok(())
    }

    fn query(&self, statement: &Statement, raw: Option<&RawHandler>) -> DbResult<Vec<Row>> {
        match statement {
            Statement::Select(select) => self.select(select),
            Statement::Raw { sql, params } => match raw {
                Some(handler) => handler(sql, params),
                None => Err(DbError::Unsupported(
                    "raw SQL needs a raw handler on the in-memory backend".into(),
                )),
            },
        }
    }

    fn select(&self, select: &Select) -> DbResult<Vec<Row>> {
        let table = self.table(&select.table)?;
        let mut rows: Vec<&Row> = table
            .rows
            .values()
            .filter(|row| select.predicates.iter().all(|p| matches(row, p)))
            .collect();

        if !select.order_by.is_empty() {
            rows.sort_by(|a, b| {
                for (column, direction) in &select.order_by {
                    let ordering = row_value(a, column)
                        .compare(row_value(b, column))
                        .unwrap_or(Ordering::Equal);
                    let ordering = match direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = select.offset.unwrap_or(0).max(0) as usize;
        let limit = select.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                if select.columns.is_empty() {
                    row.clone()
                } else {
                    row.project(&select.columns)
                }
            })
            .collect())
    }
}

/// Evaluate a predicate with SQL NULL semantics.
fn matches(row: &Row, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Compare { column, op, value } => {
            let actual = row_value(row, column);
            match (op, value.is_null()) {
                (CmpOp::Eq, true) => actual.is_null(),
                (CmpOp::Ne, true) => !actual.is_null(),
                _ if actual.is_null() || value.is_null() => false,
                _ => actual.compare(value).is_some_and(|o| op.matches(o)),
            }
        }
        Predicate::In { column, values } => {
            let actual = row_value(row, column);
            !actual.is_null()
                && values
                    .iter()
                    .any(|v| actual.compare(v) == Some(Ordering::Equal))
        }
        Predicate::RowCompare {
            columns,
            op,
            values,
        } => {
            let mut ordering = Ordering::Equal;
            for (column, value) in columns.iter().zip(values) {
                let actual = row_value(row, column);
                if actual.is_null() || value.is_null() {
                    return false;
                }
                match actual.compare(value) {
                    Some(Ordering::Equal) => continue,
                    Some(other) => {
                        ordering = other;
                        break;
                    }
                    None => return false,
                }
            }
            op.matches(ordering)
        }
    }
}

/// In-memory [`Database`].
#[derive(Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    commits: Arc<watch::Sender<u64>>,
    mutation_limit: Option<usize>,
    commit_delay: Option<Duration>,
    fail_after: Option<u64>,
    raw_handler: Option<RawHandler>,
}

impl MemoryDatabase {
    /// Create an empty database with the given tables.
    pub fn new(tables: Vec<TableDef>) -> Self {
        let state = State {
            tables: tables
                .into_iter()
                .map(|def| (def.name.clone(), MemTable::new(def)))
                .collect(),
            commits: 0,
        };
        let (commits, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(state)),
            commits: Arc::new(commits),
            mutation_limit: None,
            commit_delay: None,
            fail_after: None,
            raw_handler: None,
        }
    }

    /// Reject commits touching more than `limit` rows, cascades included.
    pub fn with_mutation_limit(mut self, limit: usize) -> Self {
        self.mutation_limit = Some(limit);
        self
    }

    /// Sleep before each [`Database::apply`] commit.
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    /// Fail every commit once `commits` commits have succeeded.
    pub fn with_failing_commits_after(mut self, commits: u64) -> Self {
        self.fail_after = Some(commits);
        self
    }

    pub fn with_raw_handler(mut self, handler: RawHandler) -> Self {
        self.raw_handler = Some(handler);
        self
    }

    /// Number of successful commits that changed something.
    pub fn commit_count(&self) -> u64 {
        *self.commits.borrow()
    }

    /// Watch the commit count.
    pub fn subscribe_commits(&self) -> watch::Receiver<u64> {
        self.commits.subscribe()
    }

    /// Every row of a table in primary key order.
    pub async fn rows(&self, table: &str) -> DbResult<Vec<Row>> {
        let state = self.state.lock().await;
        Ok(state.table(table)?.rows.values().cloned().collect())
    }

    pub async fn row_count(&self, table: &str) -> DbResult<usize> {
        let state = self.state.lock().await;
        Ok(state.table(table)?.rows.len())
    }

    fn commit_locked(&self, state: &mut State, mutations: &[Mutation]) -> DbResult<()> {
        let before = state.commits;
        state.commit(mutations, self.mutation_limit, self.fail_after)?;
        if state.commits != before {
            self.commits.send_replace(state.commits);
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn query(&self, statement: &Statement) -> DbResult<Vec<Row>> {
        let state = self.state.lock().await;
        state.query(statement, self.raw_handler.as_ref())
    }

    async fn begin(&self) -> DbResult<Box<dyn Transaction>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            guard,
            db: self.clone(),
            buffered: Vec::new(),
        }))
    }

    async fn apply(&self, mutations: Vec<Mutation>) -> DbResult<()> {
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        self.commit_locked(&mut state, &mutations)
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    db: MemoryDatabase,
    buffered: Vec<Mutation>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn query(&mut self, statement: &Statement) -> DbResult<Vec<Row>> {
        self.guard.query(statement, self.db.raw_handler.as_ref())
    }

    fn buffer(&mut self, mutation: Mutation) {
        self.buffered.push(mutation);
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let MemoryTransaction {
            mut guard,
            db,
            buffered,
        } = *self;
        db.commit_locked(&mut guard, &buffered)
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<TableDef> {
        vec![
            TableDef::new("Features", &["ID"]).unique(&["Key"]),
            TableDef::new("Notes", &["FeatureID", "Note"])
                .child_of("Features", &[("FeatureID", "ID")]),
        ]
    }

    fn feature(id: &str, key: &str) -> Row {
        Row::new().with("ID", id).with("Key", key)
    }

    fn note(feature: &str, note: &str) -> Row {
        Row::new().with("FeatureID", feature).with("Note", note)
    }

    #[tokio::test]
    async fn test_insert_duplicate_rejected_atomically() {
        let db = MemoryDatabase::new(schema());
        db.apply(vec![Mutation::insert("Features", feature("1", "grid"))])
            .await
            .unwrap();

        let err = db
            .apply(vec![
                Mutation::insert("Features", feature("2", "subgrid")),
                Mutation::insert("Features", feature("3", "grid")),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::AlreadyExists { .. }));
        assert_eq!(db.row_count("Features").await.unwrap(), 1);
        assert_eq!(db.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_and_counts_toward_limit() {
        let db = MemoryDatabase::new(schema()).with_mutation_limit(2);
        db.apply(vec![
            Mutation::insert("Features", feature("1", "grid")),
            Mutation::insert("Notes", note("1", "a")),
        ])
        .await
        .unwrap();
        db.apply(vec![Mutation::insert("Notes", note("1", "b"))])
            .await
            .unwrap();

        let err = db
            .apply(vec![Mutation::delete("Features", Row::new().with("ID", "1"))])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::MutationLimitExceeded { count: 3, limit: 2 }
        ));

        db.apply(vec![Mutation::delete(
            "Notes",
            Row::new().with("FeatureID", "1"),
        )])
        .await
        .unwrap();
        db.apply(vec![Mutation::delete("Features", Row::new().with("ID", "1"))])
            .await
            .unwrap();
        assert_eq!(db.row_count("Notes").await.unwrap(), 0);
        assert_eq!(db.row_count("Features").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_child_of_two_parents_cascades_from_either() {
        let db = MemoryDatabase::new(vec![
            TableDef::new("Searches", &["ID"]),
            TableDef::new("Channels", &["ID"]),
            TableDef::new("Subscriptions", &["ID"])
                .child_of("Searches", &[("SearchID", "ID")])
                .child_of("Channels", &[("ChannelID", "ID")]),
        ]);
        let subscription = |id: &str, channel: &str| {
            Row::new()
                .with("ID", id)
                .with("SearchID", "s1")
                .with("ChannelID", channel)
        };
        db.apply(vec![
            Mutation::insert("Searches", Row::new().with("ID", "s1")),
            Mutation::insert("Channels", Row::new().with("ID", "c1")),
            Mutation::insert("Channels", Row::new().with("ID", "c2")),
            Mutation::insert("Subscriptions", subscription("sub1", "c1")),
            Mutation::insert("Subscriptions", subscription("sub2", "c2")),
        ])
        .await
        .unwrap();

        let err = db
            .apply(vec![Mutation::insert(
                "Subscriptions",
                subscription("sub3", "missing"),
            )])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));

        db.apply(vec![Mutation::delete("Channels", Row::new().with("ID", "c1"))])
            .await
            .unwrap();
        assert_eq!(db.row_count("Subscriptions").await.unwrap(), 1);

        db.apply(vec![Mutation::delete("Searches", Row::new().with("ID", "s1"))])
            .await
            .unwrap();
        assert_eq!(db.row_count("Subscriptions").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_child_requires_parent() {
        let db = MemoryDatabase::new(schema());
        let err = db
            .apply(vec![Mutation::insert("Notes", note("missing", "a"))])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_delete_by_unique_key() {
        let db = MemoryDatabase::new(schema());
        db.apply(vec![Mutation::insert("Features", feature("1", "grid"))])
            .await
            .unwrap();
        db.apply(vec![Mutation::delete("Features", Row::new().with("Key", "grid"))])
            .await
            .unwrap();
        assert_eq!(db.row_count("Features").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let db = MemoryDatabase::new(schema());
        let err = db
            .apply(vec![Mutation::update(
                "Features",
                &["ID"],
                feature("9", "nope"),
            )])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_pages() {
        let db = MemoryDatabase::new(schema());
        db.apply(
            (1..=5)
                .map(|i| Mutation::insert("Features", feature(&i.to_string(), &format!("k{}", i))))
                .collect(),
        )
        .await
        .unwrap();

        let select = Select::from_table("Features")
            .filter("ID", CmpOp::Ge, "2")
            .order_by("ID", Direction::Desc)
            .offset(1)
            .limit(2)
            .columns(&["Key"]);
        let rows = db.query(&select.into()).await.unwrap();
        assert_eq!(
            rows,
            vec![Row::new().with("Key", "k4"), Row::new().with("Key", "k3")]
        );
    }

    #[tokio::test]
    async fn test_transaction_buffers_until_commit() {
        let db = MemoryDatabase::new(schema());
        let mut txn = db.begin().await.unwrap();
        txn.buffer(Mutation::insert("Features", feature("1", "grid")));
        let seen = txn
            .query(&Select::from_table("Features").into())
            .await
            .unwrap();
        assert!(seen.is_empty());
        txn.commit().await.unwrap();

        assert_eq!(db.row_count("Features").await.unwrap(), 1);
        assert_eq!(db.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_raw_statement_without_handler() {
        let db = MemoryDatabase::new(schema());
        let err = db.query(&Statement::raw("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, DbError::Unsupported(_)));
    }
}
