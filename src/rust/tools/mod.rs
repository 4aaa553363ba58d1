pub mod logger;

// Parent gate for the command line; submodules do not repeat it.
#[cfg(feature = "cli")]
pub mod cli;
