mod common;
mod history_tests;
mod request_tests;
