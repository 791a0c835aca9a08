pub mod cli;
pub mod compression;
