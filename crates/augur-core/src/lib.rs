//! Core types and trait definitions for Augur.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Every other crate depends on it: storage backends implement
//! [`store::ForecastStore`], venue integrations implement
//! [`source::SourceAdapter`] and model integrations implement
//! [`forecaster::Forecaster`].

// Native `async fn` in traits is used for the store contract.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod forecast;
pub mod forecaster;
pub mod question;
pub mod resolution;
pub mod score;
pub mod source;
pub mod store;

pub use error::{Error, Result};
