mod common;
mod concurrency_tests;
mod extraction_loop_tests;
