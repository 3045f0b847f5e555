pub mod api;
pub mod config;
pub mod fetch;
pub mod humanize;
pub mod imaging;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod sources;
pub mod storage;
