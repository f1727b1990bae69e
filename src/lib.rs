pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod genequery;
pub mod network;
pub mod output;
pub mod provenance;
pub mod resolve;
pub mod runner;
pub mod splitter;
pub mod store;
pub mod tables;
