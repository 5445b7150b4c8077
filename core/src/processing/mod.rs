pub mod aligner;
pub mod doa;
pub mod queue;
pub mod tap;

pub use aligner::{Aligner, AlignerObserver};
pub use doa::{DoaError, DoaEstimate, DoaEstimator, DoaParameters};
pub use queue::{Backpressure, ChannelQueue, Offer, QueueError, CHANNEL_QUEUE_CAPACITY};
pub use tap::{AuxiliaryTap, TapConfig, TapError, TapStats};
