//! Cursor over the rows of a SELECT.
//!
//! A [`Resultset`] reads from one of two row sources. Small results (at most
//! `resultset_prefetch_records` rows) are fetched up front and seeking is a
//! plain index lookup. Larger results keep the live [`ResultHandle`] and
//! move its native cursor: forward seeks fetch and discard rows one at a
//! time, backward seeks go through `data_seek`.
//!
//! Rows are hydrated lazily. The hydrated form of the current row is cached
//! until the pointer moves or the hydration mode changes.

mod row;
mod shape;

pub use row::{ResultItem, ResultRow};
pub use shape::{ComplexColumn, ResultShape};

use indexmap::IndexMap;
use modelql_core::{
    BindParams, Connection, Error, HydrateMode, Message, ModelsManager, Record, Result,
    ResultHandle, ResultsetErrorKind, Row, Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const CONTAINER_REQUIRED: &str =
    "A dependency injection container is required to access the services related to the ORM";

/// Whether every row is held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsetType {
    /// Buffered
    Full,
    /// Streaming from a live result handle
    Partial,
}

/// Builds the resultset returned for a model's simple selects.
///
/// Models register one to post-process or wrap their resultsets, e.g. to
/// force a hydration mode.
pub trait ResultsetFactory: Send + Sync {
    fn create(&self, model: &str, resultset: Resultset) -> Resultset;
}

/// Serializable copy of a resultset, used for caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsetSnapshot {
    pub shape: ResultShape,
    pub hydrate_mode: HydrateMode,
    pub rows: Vec<IndexMap<String, Value>>,
}

enum RowSource {
    Buffered(Vec<Row>),
    Streaming {
        handle: Box<dyn ResultHandle>,
        /// Position of the row the next `fetch` returns
        cursor: usize,
    },
}

/// Rows returned by a SELECT.
pub struct Resultset {
    shape: ResultShape,
    source: RowSource,
    count: usize,
    pointer: usize,
    row: Option<Row>,
    active_row: Option<ResultRow>,
    hydrate_mode: HydrateMode,
    is_fresh: bool,
    messages: Vec<Message>,
    manager: Option<Arc<dyn ModelsManager>>,
}

impl Resultset {
    /// Wrap a live result. Results with at most `prefetch` rows are buffered
    /// immediately; `prefetch == 0` always streams.
    pub fn new(shape: ResultShape, mut handle: Box<dyn ResultHandle>, prefetch: usize) -> Result<Self> {
        let count = handle.num_rows();
        let source = if count == 0 {
            RowSource::Buffered(Vec::new())
        } else if prefetch > 0 && count <= prefetch {
            RowSource::Buffered(handle.fetch_all()?)
        } else {
            RowSource::Streaming { handle, cursor: 0 }
        };
        let count = match &source {
            RowSource::Buffered(rows) => rows.len(),
            RowSource::Streaming { .. } => count,
        };
        tracing::trace!(count, buffered = matches!(source, RowSource::Buffered(_)), "resultset created");
        Ok(Self::with_source(shape, source, count))
    }

    /// A buffered resultset over already-fetched rows.
    pub fn from_rows(shape: ResultShape, rows: Vec<Row>) -> Self {
        let count = rows.len();
        Self::with_source(shape, RowSource::Buffered(rows), count)
    }

    /// Restore a cached resultset. It is never fresh.
    pub fn from_snapshot(snapshot: ResultsetSnapshot, manager: Option<Arc<dyn ModelsManager>>) -> Self {
        let rows: Vec<Row> = snapshot.rows.into_iter().map(Row::from_map).collect();
        let mut resultset = Self::from_rows(snapshot.shape, rows);
        resultset.hydrate_mode = snapshot.hydrate_mode;
        resultset.is_fresh = false;
        resultset.manager = manager;
        resultset
    }

    fn with_source(shape: ResultShape, source: RowSource, count: usize) -> Self {
        Self {
            shape,
            source,
            count,
            pointer: 0,
            row: None,
            active_row: None,
            hydrate_mode: HydrateMode::Records,
            is_fresh: true,
            messages: Vec::new(),
            manager: None,
        }
    }

    /// Manager used by [`update`](Self::update) and [`delete`](Self::delete).
    pub fn with_manager(mut self, manager: Arc<dyn ModelsManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn shape(&self) -> &ResultShape {
        &self.shape
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn valid(&self) -> bool {
        self.pointer < self.count
    }

    /// Current position, `None` past the end.
    pub fn key(&self) -> Option<usize> {
        self.valid().then_some(self.pointer)
    }

    /// Move the pointer to `position`.
    ///
    /// Out-of-range positions move the pointer (so `valid()` turns false) but
    /// keep the last materialized row.
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if self.pointer == position && self.row.is_some() {
            return Ok(());
        }

        match &mut self.source {
            RowSource::Buffered(rows) => {
                if let Some(row) = rows.get(position) {
                    self.row = Some(row.clone());
                }
            }
            RowSource::Streaming { handle, cursor } => {
                if position < self.count {
                    if position < *cursor {
                        handle.data_seek(position)?;
                        *cursor = position;
                    }
                    while *cursor < position {
                        handle.fetch()?;
                        *cursor += 1;
                    }
                    self.row = handle.fetch()?;
                    *cursor += 1;
                }
            }
        }

        self.pointer = position;
        self.active_row = None;
        Ok(())
    }

    pub fn next(&mut self) -> Result<()> {
        self.seek(self.pointer + 1)
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.seek(0)
    }

    /// The row under the pointer, hydrated according to the current mode.
    pub fn current(&mut self) -> Result<Option<ResultRow>> {
        if !self.valid() {
            return Ok(None);
        }
        if let Some(active) = &self.active_row {
            return Ok(Some(active.clone()));
        }
        if self.row.is_none() {
            self.seek(self.pointer)?;
        }
        let Some(row) = &self.row else {
            return Ok(None);
        };
        let hydrated = self.shape.hydrate(row, self.hydrate_mode)?;
        self.active_row = Some(hydrated.clone());
        Ok(Some(hydrated))
    }

    pub fn offset_exists(&self, index: usize) -> bool {
        index < self.count
    }

    /// Row at `index`; fails outside `[0, count)`.
    pub fn offset_get(&mut self, index: usize) -> Result<ResultRow> {
        let out_of_range =
            || Error::resultset(ResultsetErrorKind::OutOfRange, "The index does not exist in the cursor");
        if index >= self.count {
            return Err(out_of_range());
        }
        self.seek(index)?;
        self.current()?.ok_or_else(out_of_range)
    }

    /// Resultsets are read-only; always fails.
    pub fn offset_set(&mut self, _index: usize, _row: ResultRow) -> Result<()> {
        Err(immutable())
    }

    /// Resultsets are read-only; always fails.
    pub fn offset_unset(&mut self, _index: usize) -> Result<()> {
        Err(immutable())
    }

    pub fn get_first(&mut self) -> Result<Option<ResultRow>> {
        if self.count == 0 {
            return Ok(None);
        }
        self.seek(0)?;
        self.current()
    }

    pub fn get_last(&mut self) -> Result<Option<ResultRow>> {
        if self.count == 0 {
            return Ok(None);
        }
        self.seek(self.count - 1)?;
        self.current()
    }

    pub fn hydrate_mode(&self) -> HydrateMode {
        self.hydrate_mode
    }

    pub fn set_hydrate_mode(&mut self, mode: HydrateMode) -> &mut Self {
        if self.hydrate_mode != mode {
            self.hydrate_mode = mode;
            self.active_row = None;
        }
        self
    }

    /// Iterate from the first row. Each step moves the resultset's pointer.
    pub fn iter(&mut self) -> Iter<'_> {
        Iter {
            resultset: self,
            started: false,
            done: false,
        }
    }

    /// Every row; rows of simple resultsets come back as attribute maps.
    pub fn to_array(&mut self) -> Result<Vec<ResultRow>> {
        let previous = self.hydrate_mode;
        if self.shape.is_simple() {
            self.set_hydrate_mode(HydrateMode::Arrays);
        }
        let rows = self.iter().collect::<Result<Vec<_>>>();
        self.set_hydrate_mode(previous);
        rows
    }

    pub fn to_json(&mut self) -> Result<serde_json::Value> {
        let rows = self
            .iter()
            .map(|row| row.map(|row| row.to_json()))
            .collect::<Result<Vec<_>>>()?;
        Ok(serde_json::Value::Array(rows))
    }

    /// Apply `f` to every row, keeping the rows it returns.
    pub fn filter<F>(&mut self, mut f: F) -> Result<Vec<ResultRow>>
    where
        F: FnMut(ResultRow) -> Option<ResultRow>,
    {
        let mut kept = Vec::new();
        for row in self.iter() {
            if let Some(row) = f(row?) {
                kept.push(row);
            }
        }
        Ok(kept)
    }

    /// Copy of the rows for caching. A streaming resultset is buffered first.
    pub fn snapshot(&mut self) -> Result<ResultsetSnapshot> {
        let rows = self.buffered_rows()?.iter().map(Row::to_map).collect();
        Ok(ResultsetSnapshot {
            shape: self.shape.clone(),
            hydrate_mode: self.hydrate_mode,
            rows,
        })
    }

    fn buffered_rows(&mut self) -> Result<&[Row]> {
        if let RowSource::Streaming { handle, .. } = &mut self.source {
            handle.data_seek(0)?;
            let rows = handle.fetch_all()?;
            self.count = rows.len();
            self.source = RowSource::Buffered(rows);
            self.row = None;
            self.active_row = None;
        }
        match &self.source {
            RowSource::Buffered(rows) => Ok(rows),
            RowSource::Streaming { .. } => Ok(&[]),
        }
    }

    /// Whether the rows come from the database rather than a cache.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh
    }

    pub fn set_is_fresh(&mut self, is_fresh: bool) -> &mut Self {
        self.is_fresh = is_fresh;
        self
    }

    pub fn get_type(&self) -> ResultsetType {
        match self.source {
            RowSource::Buffered(_) => ResultsetType::Full,
            RowSource::Streaming { .. } => ResultsetType::Partial,
        }
    }

    /// Messages of the record that made the last batch operation fail.
    pub fn get_messages(&self) -> &[Message] {
        &self.messages
    }

    /// Assign `data` to every record and update it.
    pub fn update(&mut self, data: &IndexMap<String, Value>) -> Result<bool> {
        self.update_where(data, |_| true)
    }

    /// Assign `data` to every record accepted by `predicate` and update it.
    ///
    /// All updates run in one write transaction, opened on the first record
    /// that is updated. The first failure rolls back and returns `false`;
    /// [`get_messages`](Self::get_messages) then holds that record's messages.
    #[tracing::instrument(level = "debug", skip_all, fields(count = self.count))]
    pub fn update_where<P>(&mut self, data: &IndexMap<String, Value>, predicate: P) -> Result<bool>
    where
        P: FnMut(&ResultRow) -> bool,
    {
        self.mutate(predicate, |manager, record, connection| {
            record.assign(data.iter().map(|(name, value)| (name.clone(), value.clone())));
            manager.persister().update(manager, record, connection)
        })
    }

    /// Delete every record.
    pub fn delete(&mut self) -> Result<bool> {
        self.delete_where(|_| true)
    }

    /// Delete every record accepted by `predicate`, in one transaction.
    #[tracing::instrument(level = "debug", skip_all, fields(count = self.count))]
    pub fn delete_where<P>(&mut self, predicate: P) -> Result<bool>
    where
        P: FnMut(&ResultRow) -> bool,
    {
        self.mutate(predicate, |manager, record, connection| {
            manager.persister().delete(manager, record, connection)
        })
    }

    fn mutate<P, M>(&mut self, mut predicate: P, mut mutation: M) -> Result<bool>
    where
        P: FnMut(&ResultRow) -> bool,
        M: FnMut(&dyn ModelsManager, &mut Record, &dyn Connection) -> Result<bool>,
    {
        let manager = self
            .manager
            .clone()
            .ok_or_else(|| Error::config(CONTAINER_REQUIRED))?;
        let mut transaction: Option<Arc<dyn Connection>> = None;

        self.rewind()?;
        while self.valid() {
            let Some(row) = self.current()? else {
                break;
            };
            if !predicate(&row) {
                self.next()?;
                continue;
            }
            let Some(mut record) = row.into_record() else {
                return Err(Error::resultset(
                    ResultsetErrorKind::InvalidRecord,
                    "The returned record is not valid",
                ));
            };

            let connection = match &transaction {
                Some(connection) => Arc::clone(connection),
                None => {
                    let connection = manager.write_connection(record.model(), &BindParams::new())?;
                    connection.begin()?;
                    transaction = Some(Arc::clone(&connection));
                    connection
                }
            };

            match mutation(manager.as_ref(), &mut record, connection.as_ref()) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(model = record.model(), "batch operation failed, rolling back");
                    self.messages = record.messages().to_vec();
                    connection.rollback()?;
                    return Ok(false);
                }
                Err(err) => {
                    if let Err(rollback) = connection.rollback() {
                        tracing::warn!(error = %rollback, "rollback after failed batch operation failed");
                    }
                    return Err(err);
                }
            }
            self.next()?;
        }

        if let Some(connection) = transaction {
            connection.commit()?;
        }
        Ok(true)
    }
}

fn immutable() -> Error {
    Error::resultset(
        ResultsetErrorKind::Immutable,
        "Cursor is an immutable ArrayAccess object",
    )
}

impl fmt::Debug for Resultset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resultset")
            .field("shape", &self.shape)
            .field("type", &self.get_type())
            .field("count", &self.count)
            .field("pointer", &self.pointer)
            .field("hydrate_mode", &self.hydrate_mode)
            .field("is_fresh", &self.is_fresh)
            .finish()
    }
}

/// Iterator returned by [`Resultset::iter`].
pub struct Iter<'a> {
    resultset: &'a mut Resultset,
    started: bool,
    done: bool,
}

impl Iterator for Iter<'_> {
    type Item = Result<ResultRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let moved = if self.started {
            self.resultset.next()
        } else {
            self.started = true;
            self.resultset.rewind()
        };
        let current = moved.and_then(|()| self.resultset.current());
        match current {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
