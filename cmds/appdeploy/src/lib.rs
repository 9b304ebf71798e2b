pub mod commands;
pub mod invocation;
pub mod k8s;
pub mod manifest;
pub mod runner;
pub mod telemetry;
pub mod template;
#[cfg(test)]
pub mod test_utils;
