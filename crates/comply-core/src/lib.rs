//! Core library for `comply`.
//!
//! Contains the persistence adapter, the generic record store, the three
//! domain schemas (objective tracker, client portfolio, settings), form
//! sessions, list/table view models, export/import, and the notification
//! center. This crate depends on `comply-storage` for the storage backend
//! trait and knows nothing about how the UI layer renders anything.

pub mod client;
pub mod error;
pub mod evidence;
pub mod export;
pub mod form;
pub mod notify;
pub mod persist;
pub mod settings;
pub mod store;
pub mod view;
