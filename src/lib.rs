// Library interface for morningbyte modules
// This allows tests and the auxiliary binaries to import modules

pub mod article;
pub mod collector;
pub mod config;
pub mod digest;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod store;
