// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Error Types
//!
//! This module provides the error taxonomy for the Fibra runtime.
//! Capacity errors and vacuous operations are returned to callers as
//! ordinary status values; host-primitive failures are fatal and never
//! reach this type (see [`crate::runtime::fatal`]).

use std::fmt;

/// Errors returned by the Fibra runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `create` found no `Invalid` slot in the TCB table.
    CapacityExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExhausted => write!(f, "no free thread control block slot"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for Fibra operations.
pub type Result<T = ()> = std::result::Result<T, Error>;
