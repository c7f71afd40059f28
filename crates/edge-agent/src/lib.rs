pub mod agent;
pub mod bridge;
pub mod classifier;
pub mod credentials;
pub mod errors;
pub mod executor;
pub mod models;
pub mod pipeline;
pub mod prompt_template;
pub mod providers;
pub mod request;
pub mod tools;
