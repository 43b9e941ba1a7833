//! # Integration Scenarios
//!
//! The engine wired to its in-process adapters: subscriber registry, stage
//! executors, topic ACL, log sinks and the tokio scheduler.


#[cfg(test)]
mod delivery;
#[cfg(test)]
mod locals;
#[cfg(test)]
mod scheduling;
#[cfg(test)]
mod staging;
