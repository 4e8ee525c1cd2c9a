pub mod config;
pub mod demo;
pub mod engine;
pub mod error;
pub mod node;
pub mod queue;
pub mod scenario;
pub mod sim;

#[cfg(test)]
mod test;
