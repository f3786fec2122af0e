pub mod access;
pub mod cascade;
pub mod channels;
pub mod events;
pub mod position;
pub mod reconcile;
pub mod search;
pub mod service;
pub mod storage;
pub mod sync;
pub mod types;
