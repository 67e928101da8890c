pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod media;
pub mod orchestrator;
pub mod planner;
pub mod providers;
pub mod resolver;
pub mod tts;
