pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod load;
pub mod migrate;
pub mod mongo_ext;
pub mod notify;
pub mod presence;
pub mod util;
