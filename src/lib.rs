// Suppress style lints that predate the -D warnings CI policy.
#![allow(
    clippy::collapsible_if,
    clippy::len_without_is_empty,
    clippy::new_without_default,
    clippy::redundant_closure,
    clippy::type_complexity,
    clippy::useless_format
)]

pub mod api;
pub mod app;
pub mod common;
pub mod config;
pub mod engine;
pub mod record;
pub mod store;
