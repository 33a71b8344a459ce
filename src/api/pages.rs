//! Purpose: Translate logical collection queries into paginated HTTP fetches.
//! Exports: `ListQuery`, `Filter`, `RecordPages`, `DEFAULT_PAGE_SIZE`.
//! Role: Lazy record sequence; pages are fetched as the caller consumes it.
//! Invariants: Records come out in server order, de-duplicated by id.
//! Invariants: Filters are pushed server-side and re-checked client-side, so
//! Invariants: callers only observe matching records either way.
#![allow(clippy::result_large_err)]

use crate::api::transport::Transport;
use crate::core::error::{Error, ErrorKind};
use crate::core::record::Record;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Predicate over a collection. Label comparisons are case-sensitive against
/// the server-reported strings; the status vocabulary is deployment-defined,
/// not a closed enum.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Filter {
    Status(String),
    Category(String),
}

impl Filter {
    /// Server-side form, using the upstream `q` search syntax.
    pub(crate) fn query_value(&self) -> String {
        match self {
            Filter::Status(status) => format!("status:\"{status}\""),
            Filter::Category(category) => format!("category:\"{category}\""),
        }
    }

    /// Client-side check applied to every fetched record. A record that does
    /// not carry the label field at all is trusted to the server-side filter.
    pub(crate) fn matches(&self, record: &Record) -> bool {
        let (names, wanted): (&[&str], &str) = match self {
            Filter::Status(status) => (&["status_title", "status"], status),
            Filter::Category(category) => (&["category_title", "category"], category),
        };
        match record.text(names) {
            Some(label) => label == wanted,
            None => true,
        }
    }
}

/// A logical, potentially multi-page collection request. Not persisted.
#[derive(Clone, Debug)]
pub struct ListQuery {
    filter: Option<Filter>,
    page_size: usize,
    offset: usize,
}

impl ListQuery {
    pub fn new() -> Self {
        Self {
            filter: None,
            page_size: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy cursor over one collection endpoint. Each `next_record` call pulls
/// from the current page buffer and fetches the next page only when the
/// buffer runs dry, so abandoning the cursor early skips the remaining
/// HTTP round-trips.
pub struct RecordPages<'a> {
    transport: &'a Transport,
    endpoint: &'static str,
    query: ListQuery,
    next_offset: usize,
    buffered: VecDeque<Record>,
    seen: HashSet<i64>,
    exhausted: bool,
}

impl<'a> RecordPages<'a> {
    pub(crate) fn new(transport: &'a Transport, endpoint: &'static str, query: ListQuery) -> Self {
        let next_offset = query.offset;
        Self {
            transport,
            endpoint,
            query,
            next_offset,
            buffered: VecDeque::new(),
            seen: HashSet::new(),
            exhausted: false,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<Record>, Error> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page()?;
        }
    }

    fn fetch_page(&mut self) -> Result<(), Error> {
        let limit = self.query.page_size.to_string();
        let offset = self.next_offset.to_string();
        let mut query: Vec<(&str, &str)> = vec![("limit", &limit), ("offset", &offset)];
        let server_filter = self.query.filter.as_ref().map(Filter::query_value);
        if let Some(value) = &server_filter {
            query.push(("q", value));
        }

        let value = self.transport.get_json(&[self.endpoint], &query)?;
        let page = parse_page(value)?;
        let fetched = page.records.len();
        debug!(
            endpoint = self.endpoint,
            offset = self.next_offset,
            fetched,
            "collection page"
        );

        for record in page.records {
            if let Some(filter) = &self.query.filter {
                if !filter.matches(&record) {
                    continue;
                }
            }
            let id = record.id()?;
            if !self.seen.insert(id) {
                continue;
            }
            self.buffered.push_back(record);
        }

        self.next_offset += fetched;
        // Either termination convention ends the sequence: an explicit
        // continuation flag when the server sends one, otherwise a page
        // shorter than the requested size.
        self.exhausted = match page.has_more {
            Some(has_more) => !has_more,
            None => fetched < self.query.page_size,
        };
        Ok(())
    }
}

impl Iterator for RecordPages<'_> {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

struct Page {
    records: Vec<Record>,
    has_more: Option<bool>,
}

/// Accept both collection shapes: a bare JSON array (short-page heuristic
/// terminates) or an `{"items": [...], "has_more": bool}` envelope.
fn parse_page(value: Value) -> Result<Page, Error> {
    match value {
        Value::Array(items) => Ok(Page {
            records: records_from(items)?,
            has_more: None,
        }),
        Value::Object(mut map) => {
            let items = match map.remove("items") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(Error::new(ErrorKind::Internal)
                        .with_message("collection response is neither an array nor an items envelope"));
                }
            };
            let has_more = map.get("has_more").and_then(Value::as_bool);
            Ok(Page {
                records: records_from(items)?,
                has_more,
            })
        }
        _ => Err(Error::new(ErrorKind::Internal)
            .with_message("collection response is not a JSON collection")),
    }
}

fn records_from(items: Vec<Value>) -> Result<Vec<Record>, Error> {
    items.into_iter().map(Record::from_value).collect()
}
