//! Data models for planpoker

mod participant;
mod scale;
mod snapshot;
mod view;

pub use participant::*;
pub use scale::*;
pub use snapshot::*;
pub use view::*;
