#![cfg(test)]

pub mod common;
pub mod boot_tests;
pub mod hook_tests;
pub mod wait_tests;
