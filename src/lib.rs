pub mod config;
pub mod errors;
pub mod generate;
pub mod materialize;
pub mod pipeline;
pub mod publish;
pub mod queue;
pub mod store;
pub mod toolchain;
pub mod util;
pub mod worker;
pub mod workspace;
