//! Purpose: Typed wrappers over raw records for the resource types we cover.
//! Exports: `Experiment`, `Item`, `Team`, `User`, `Attachment`, `Listable`, `Listing`.
//! Role: Read-through projections; mutation goes through client write calls
//! Role: followed by a re-fetch, never through these wrappers.
//! Invariants: Accessors never fail on missing fields; unknown fields are
//! Invariants: reachable through `field()` with the `Absent` sentinel.
#![allow(clippy::result_large_err)]

use crate::api::pages::RecordPages;
use crate::core::error::Error;
use crate::core::record::{FieldValue, Record};
use std::marker::PhantomData;

/// A resource type with a list endpoint. Implemented per type rather than
/// configured at runtime so the endpoint and the wrapper cannot drift apart.
pub trait Listable: Sized {
    fn endpoint() -> &'static str;
    fn from_record(record: Record) -> Self;
    fn record(&self) -> &Record;
}

/// One file reference attached to a resource, parsed from the server's
/// `uploads` array. Entries without an id and filename are skipped.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub upload_id: i64,
    pub filename: String,
    pub filesize: Option<u64>,
    pub hash: Option<String>,
    pub hash_algorithm: Option<String>,
}

pub(crate) fn attachments_of(record: &Record) -> Vec<Attachment> {
    let Some(uploads) = record.array_field("uploads") else {
        return Vec::new();
    };
    let mut attachments = Vec::new();
    for upload in uploads {
        let Some(upload_id) = upload.get("id").and_then(serde_json::Value::as_i64) else {
            continue;
        };
        let Some(filename) = upload.get("real_name").and_then(serde_json::Value::as_str) else {
            continue;
        };
        attachments.push(Attachment {
            upload_id,
            filename: filename.to_string(),
            filesize: upload.get("filesize").and_then(serde_json::Value::as_u64),
            hash: upload
                .get("hash")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            hash_algorithm: upload
                .get("hash_algorithm")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
        });
    }
    attachments
}

macro_rules! record_wrapper {
    ($name:ident, $endpoint:literal) => {
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            record: Record,
        }

        impl $name {
            pub fn id(&self) -> Result<i64, Error> {
                self.record.id()
            }

            pub fn field(&self, name: &str) -> FieldValue {
                self.record.field(name)
            }

            pub fn record(&self) -> &Record {
                &self.record
            }

            pub fn into_record(self) -> Record {
                self.record
            }
        }

        impl Listable for $name {
            fn endpoint() -> &'static str {
                $endpoint
            }

            fn from_record(record: Record) -> Self {
                Self { record }
            }

            fn record(&self) -> &Record {
                &self.record
            }
        }
    };
}

record_wrapper!(Experiment, "experiments");
record_wrapper!(Item, "items");
record_wrapper!(Team, "teams");
record_wrapper!(User, "users");

impl Experiment {
    pub fn title(&self) -> Option<String> {
        self.record.text(&["title"])
    }

    pub fn status_label(&self) -> Option<String> {
        self.record.text(&["status_title", "status"])
    }

    pub fn category_label(&self) -> Option<String> {
        self.record.text(&["category_title", "category"])
    }

    pub fn created_at(&self) -> Option<String> {
        self.record.text(&["created_at"])
    }

    pub fn elabid(&self) -> Option<String> {
        self.record.text(&["elabid"])
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        attachments_of(&self.record)
    }
}

impl Item {
    pub fn title(&self) -> Option<String> {
        self.record.text(&["title"])
    }

    pub fn status_label(&self) -> Option<String> {
        self.record.text(&["status_title", "status"])
    }

    pub fn category_label(&self) -> Option<String> {
        self.record.text(&["category_title", "category"])
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        attachments_of(&self.record)
    }
}

impl Team {
    pub fn name(&self) -> Option<String> {
        self.record.text(&["name"])
    }
}

impl User {
    pub fn fullname(&self) -> Option<String> {
        self.record.text(&["fullname"])
    }

    pub fn email(&self) -> Option<String> {
        self.record.text(&["email"])
    }
}

/// Typed adapter over a lazy record cursor. Consuming it drives the page
/// fetches; dropping it early stops them.
pub struct Listing<'a, T> {
    pages: RecordPages<'a>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Listable> Listing<'a, T> {
    pub(crate) fn new(pages: RecordPages<'a>) -> Self {
        Self {
            pages,
            _marker: PhantomData,
        }
    }

    pub fn next_resource(&mut self) -> Result<Option<T>, Error> {
        Ok(self.pages.next_record()?.map(T::from_record))
    }

    /// Drain the remaining sequence into a vector, failing on the first
    /// transport or decoding error.
    pub fn collect_all(mut self) -> Result<Vec<T>, Error> {
        let mut out = Vec::new();
        while let Some(resource) = self.next_resource()? {
            out.push(resource);
        }
        Ok(out)
    }
}

impl<T: Listable> Iterator for Listing<'_, T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_resource().transpose()
    }
}
