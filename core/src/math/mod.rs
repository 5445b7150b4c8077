pub mod phase;

pub use phase::PhaseHelper;
