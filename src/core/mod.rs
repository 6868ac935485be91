pub mod cleanup;
pub mod controller;
pub mod error;
pub mod events;
pub mod format;
pub mod gate;
pub mod link;
pub mod model;
pub mod progress;
