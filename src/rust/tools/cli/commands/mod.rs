pub mod compile;
pub mod init;
pub mod play;
pub mod render;
pub mod source;
