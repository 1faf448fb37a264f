//! Execution engine tests

mod helpers;

mod assign_tests;
mod conditional_tests;
mod function_tests;
mod http_tests;
mod scope_tests;
