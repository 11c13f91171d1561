//! Unit tests for configuration loading and validation.
//!
//! Tests are organised into modules by functional area:
//! - `helpers`: Shared test utilities
//! - `precedence`: Layer precedence tests
//! - `loading`: Environment and CLI loading through `load_from_iter`
//! - `validation`: Required-field and consistency checks

mod helpers;
