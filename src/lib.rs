#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod normalize;
pub mod notify;
pub mod politeness;
pub mod reconcile;
pub mod relay;
pub mod resolver;
pub mod sites;
pub mod store;
pub mod title;
