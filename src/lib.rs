//! LLM batch job tracker
//!
//! Tracks asynchronous batch jobs at Google (Gemini and Vertex AI), OpenAI and
//! Anthropic, maps each vendor's job states onto one status vocabulary, and
//! keeps the jobs still in flight in line-oriented state files that an
//! external polling loop reconciles until the newest file is empty.

pub mod config;
pub mod logging;
pub mod models;
pub mod providers;
pub mod services;
