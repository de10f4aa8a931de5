//! Datafile, record and key directory tests

mod file_tests;
mod record_tests;
