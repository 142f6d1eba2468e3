//! Reconciles `NovaExternalCompute` records on behalf of data plane nodes.
//!
//! The deploy step lives in [`deploy`]; [`store`] defines the versioned storage
//! it runs against and [`db`] provides a SQLite implementation. [`reconcile`],
//! [`api`] and the `dpctl` binary drive single passes over stored nodes.

pub mod api;
pub mod config;
pub mod db;
pub mod deploy;
pub mod models;
pub mod reconcile;
pub mod store;
