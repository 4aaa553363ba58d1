pub mod audio;
pub mod bridge;
pub mod processor;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_fixtures;
