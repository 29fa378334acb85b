//! # LabelDB Query
//!
//! The label-selector query language for LabelDB.
//!
//! This crate provides:
//! - A hand-written parser for selector strings (`y=hello, x>1, !a`)
//! - The predicate tree consumed by the entity store
//! - Predicate evaluation against schema-less JSON entities

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod predicate;
mod selector;

pub use error::{QueryError, QueryResult};
pub use predicate::{Predicate, Query};
pub use selector::translate;
