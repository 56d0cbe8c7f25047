pub mod config;
pub mod fd_limit;
pub mod logger;
pub mod refinery_toml;
pub mod tempfiles;

pub use config::*;
pub use fd_limit::{FDS_PER_WORKER, capped_workers, max_open_fds, max_workers_by_fd_limit};
pub use logger::{Colors, setup_logging};
pub use refinery_toml::{BuilderConfig, RefineryToml, apply_file_to_opts, load_refinery_toml};
