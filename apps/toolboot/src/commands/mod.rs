//! Command modules for the toolboot CLI.
//!
//! - [`cipd`] - Install the package client binary
//! - [`go`] - Install a Go distribution
//!
//! Both share the install flags and result handling in [`common`].

pub mod cipd;
pub mod common;
pub mod go;
