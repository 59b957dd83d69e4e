//! Integration tests for externa-lib.

mod algorithm_tests;
mod common;
mod prebuild_tests;
mod scheduler_tests;
mod store_tests;
