pub mod archive;
pub mod commands;
pub mod config;
pub mod deps;
pub mod descriptor;
pub mod digest;
pub mod environment;
pub mod error;
pub mod fetch;
pub mod http;
pub mod installer;
pub mod link;
pub mod lock;
pub mod receipt;
pub mod rollback;
pub mod runtime;
pub mod smoke;
