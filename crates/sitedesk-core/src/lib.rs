pub mod activity;
pub mod calendar;
pub mod config;
pub mod credentials;
pub mod custom_field;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod event;
pub mod fanout;
pub mod milestone;
pub mod notification;
pub mod progress;
pub mod project;
pub mod session;
pub mod site_manager;
pub mod supervisor;
pub mod task;
pub mod tender;
pub mod types;
pub mod user;

#[cfg(test)]
mod testutil;

pub use db::Store;
pub use error::{Result, SiteError};
