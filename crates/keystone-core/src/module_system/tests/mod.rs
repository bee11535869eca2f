// Module system test modules
#[cfg(test)]
mod descriptor_tests;
#[cfg(test)]
mod registry_tests;
