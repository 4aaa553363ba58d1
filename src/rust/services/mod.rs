pub mod compile;

#[cfg(feature = "cli")]
pub mod live;

#[cfg(feature = "cli")]
pub mod watch;
