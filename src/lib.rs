//! Weather-alert engine for the Kheti Sahayak farmer portal: evaluates
//! observations against a rule catalog, matches geospatial subscriptions
//! and per-user preferences, and fans admitted alerts out to push, SMS and
//! in-app channels with a durable history. The portal's REST layer calls
//! into [`registry::SubscriptionRegistry`], [`dispatcher`] and
//! [`scheduler::AlertScheduler`]; the bundled binary runs the periodic
//! check loop.

pub mod channels;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod policy;
pub mod registry;
pub mod scheduler;
pub mod weather;
