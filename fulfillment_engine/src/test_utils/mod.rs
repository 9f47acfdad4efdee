//! Helpers for setting up throwaway test databases. Feature-gated behind `test_utils`.
pub mod prepare_env;
