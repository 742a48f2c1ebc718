//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the API.

pub mod health;
pub mod login;
pub mod swaps;
