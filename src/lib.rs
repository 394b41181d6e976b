#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! Unified file operations over FTP, SFTP and SMB.
//!
//! One contract — create, delete, move, copy, read, stat — with three
//! backends that behave identically from the caller's perspective, including
//! recursive ancestor creation and copy-via-local-staging where a protocol
//! has no native equivalent.

pub mod client;
pub mod error;

mod ensure;
mod ops;
mod path;
mod probe;
mod session;
mod transfer;

#[cfg(test)]
mod testutil;

pub use client::{
    client_for, Endpoint, FileMetadata, FileSystemClient, Protocol,
};
pub use error::FsError;
