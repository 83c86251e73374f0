pub mod composite;
pub mod epoch_stats;
pub mod loop_fn;
pub mod train_config;
pub mod trainer;

pub use composite::{initial_image, Composite};
pub use epoch_stats::EpochStats;
pub use loop_fn::{train_loop, TrainOutcome};
pub use train_config::TrainConfig;
pub use trainer::{TrainPhase, Trainer};
