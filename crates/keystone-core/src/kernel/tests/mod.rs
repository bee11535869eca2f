#[cfg(test)]
mod bootstrap_tests;
