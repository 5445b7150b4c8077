pub mod channel;
pub mod monitor;
pub mod profile;

pub use channel::SyntheticChannel;
pub use monitor::SyntheticPacketSource;
pub use profile::{interferometer_phase, GeneratorConfig};
