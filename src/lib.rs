//! Bookline prerender — static-site prerendering pipeline.
//!
//! Renders every route of the built Bookline web bundle in a headless
//! browser and persists the resulting HTML so a plain static file server can
//! serve first-paint-complete pages. One offline batch pass over a known
//! route set; not a crawler, not a bundler.

pub mod catalog;
pub mod config;
pub mod doctor;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod server;
