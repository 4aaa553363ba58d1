// Aggregator test: include tests from tests/rust/* as distinct modules.
// This keeps sources organized while providing a single integration test
// file that Cargo will compile and run.

mod rust_tests {
    #[cfg(feature = "cli")]
    pub mod cli_help {
        include!("rust/cli_help.rs");
    }
    #[cfg(feature = "cli")]
    pub mod cli_version {
        include!("rust/cli_version.rs");
    }
    #[cfg(feature = "cli")]
    pub mod cli_init {
        include!("rust/cli_init.rs");
    }
    #[cfg(feature = "cli")]
    pub mod cli_compile {
        include!("rust/cli_compile.rs");
    }
    #[cfg(feature = "cli")]
    pub mod cli_render {
        include!("rust/cli_render.rs");
    }
    pub mod runtime_end_to_end {
        include!("rust/runtime_end_to_end.rs");
    }
}

// Re-export tests so the test runner finds them at crate root.
pub use rust_tests::*;
