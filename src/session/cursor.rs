use std::collections::VecDeque;
use std::marker::PhantomData;
use tracing::{Level, event};
use crate::connection::ResultSet;
use crate::core::{DbError, Result, Row};
use super::mapper::{FromRow, RowBinding};
use super::SessionState;

/// Forward-only, single-pass view over a query result.
///
/// Rows are pulled from the backend `fetch_size` at a time and mapped through a
/// [`RowBinding`]. The one-shot fetches (`fetch_list`, `fetch_single`,
/// `fetch_single_or_null`) close the cursor on success and on failure; a closed
/// cursor answers [`DbError::CursorClosed`].
pub struct Cursor<'a, T> {
    rows: Option<Box<dyn ResultSet + 'a>>,
    binding: RowBinding,
    buffer: VecDeque<Row>,
    fetch_size: usize,
    exhausted: bool,
    delivered: usize,
    session_state: Option<&'a mut SessionState>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: FromRow> Cursor<'a, T> {
    /// Wraps an open result set. `fetch_size` must be positive.
    pub fn new(rows: Box<dyn ResultSet + 'a>, binding: RowBinding, fetch_size: usize) -> Result<Self> {
        if fetch_size == 0 {
            return Err(DbError::InvalidArgument("fetch size must be > 0".into()));
        }
        Ok(Self {
            rows: Some(rows),
            binding,
            buffer: VecDeque::with_capacity(fetch_size),
            fetch_size,
            exhausted: false,
            delivered: 0,
            session_state: None,
            _marker: PhantomData,
        })
    }

    /// Connectivity failures while fetching mark the owning session broken.
    pub(crate) fn attach(mut self, state: &'a mut SessionState) -> Self {
        self.session_state = Some(state);
        self
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    pub fn binding(&self) -> &RowBinding {
        &self.binding
    }

    pub fn is_closed(&self) -> bool {
        self.rows.is_none()
    }

    /// Rows handed out so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Drains every remaining row, then closes.
    pub fn fetch_list(&mut self) -> Result<Vec<T>> {
        let result = self.drain();
        self.close();
        result
    }

    /// Exactly one row: zero is [`DbError::NotFound`], more is [`DbError::TooManyRows`].
    pub fn fetch_single(&mut self) -> Result<T> {
        self.fetch_single_or_null()?.ok_or(DbError::NotFound)
    }

    /// At most one row: zero yields `None`, more is [`DbError::TooManyRows`].
    pub fn fetch_single_or_null(&mut self) -> Result<Option<T>> {
        let result = self.single();
        self.close();
        result
    }

    /// The next mapped row, or `None` once the result is exhausted (which closes the cursor).
    pub fn next_row(&mut self) -> Result<Option<T>> {
        match self.pull() {
            Ok(Some(row)) => match self.map_row(row) {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    self.close();
                    Err(err)
                }
            },
            Ok(None) => {
                self.close();
                Ok(None)
            }
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    fn drain(&mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(row) = self.pull()? {
            items.push(self.map_row(row)?);
        }
        Ok(items)
    }

    fn single(&mut self) -> Result<Option<T>> {
        let Some(first) = self.pull()? else {
            return Ok(None);
        };
        if self.pull()?.is_some() {
            return Err(DbError::TooManyRows);
        }
        self.map_row(first).map(Some)
    }

    fn map_row(&mut self, row: Row) -> Result<T> {
        let value = T::from_row(self.binding.map(row)?)?;
        self.delivered += 1;
        Ok(value)
    }

    fn pull(&mut self) -> Result<Option<Row>> {
        if self.rows.is_none() {
            return Err(DbError::CursorClosed);
        }

        if self.buffer.is_empty() && !self.exhausted {
            let batch = match self.rows.as_mut() {
                Some(rows) => rows.fetch(self.fetch_size),
                None => return Err(DbError::CursorClosed),
            };
            match batch {
                Ok(batch) => {
                    // Batches may come back short; only an empty one ends the result.
                    self.exhausted = batch.is_empty();
                    self.buffer.extend(batch);
                }
                Err(err) => {
                    if err.is_connectivity() {
                        if let Some(state) = self.session_state.as_deref_mut() {
                            *state = SessionState::Broken;
                        }
                    }
                    return Err(err);
                }
            }
        }

        Ok(self.buffer.pop_front())
    }

    /// Releases the result set. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.rows.take().is_some() {
            self.buffer.clear();
            event!(
                Level::DEBUG,
                shape = %self.binding.shape_name(),
                rows = self.delivered,
                "cursor closed"
            );
        }
    }
}

impl<T: FromRow> Iterator for Cursor<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_closed() {
            return None;
        }
        self.next_row().transpose()
    }
}

impl<T> Drop for Cursor<'_, T> {
    fn drop(&mut self) {
        self.rows.take();
    }
}

impl<T> std::fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("shape", &self.binding.shape_name())
            .field("fetch_size", &self.fetch_size)
            .field("buffered", &self.buffer.len())
            .field("closed", &self.rows.is_none())
            .finish()
    }
}
