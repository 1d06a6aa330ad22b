//! A general on-disk inverted index.
//!
//! [`Gix`] maps keys to postings, ordered sets of items such as document
//! ids. The postings of a key live in an [`ItemSet`]: recent items collect
//! in an in-memory buffer which is pushed into child segments stored as
//! separate blobs once it fills up. Item-sets are merged lazily, cached in a
//! memory bounded LRU, and written back to the blob heap on eviction or
//! close.
//!
//! Ordering and set algebra over items are supplied by a [`Merger`]. Boolean
//! queries are built as [`Expr`] trees and evaluated against an index
//! without ever materializing the complement of a negated subtree.
//!
//! ```no_run
//! use invix::{AccessMode, Expr, Gix, GixOption};
//!
//! # fn main() -> Result<(), invix::GixError> {
//! let option = GixOption::from("/tmp/terms").mode(AccessMode::Create);
//! let mut gix: Gix<String, u64> = Gix::open(option)?;
//! gix.add_item(&"rust".to_string(), 1)?;
//! gix.add_item(&"index".to_string(), 1)?;
//!
//! let query = Expr::new_and_keys(["rust".to_string(), "index".to_string()]);
//! let (docs, negated) = query.eval(&mut gix)?;
//! assert_eq!((docs, negated), (vec![1], false));
//! gix.close()?;
//! # Ok(())
//! # }
//! ```

mod blob;
mod cache;
mod error;
mod gix;
mod item_set;
mod merger;
mod observability;
mod option;
mod query;
pub mod serdes;
mod trigger;

pub use crate::{
    blob::{BlobPtr, BlobStore, FileBlobStore, MemBlobStore},
    cache::{ItemSetCache, MemSized},
    error::{BlobError, CodecError, GixError},
    gix::{Gix, IndexItem, IndexKey, KeyNamer},
    item_set::{ChildInfo, ItemSet, ItemSetHandle, Storage},
    merger::{DefaultMerger, Merger},
    option::{AccessMode, GixOption},
    query::Expr,
    trigger::SplitTrigger,
};
