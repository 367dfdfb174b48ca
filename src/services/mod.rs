pub mod excel;
pub mod file_processor;
pub mod llm_agent;
pub mod normalizer;
pub mod post_processor;
pub mod prompt;
pub mod schema;
pub mod session_store;
