//! These models represent the objects passed around by the agent
//!
//! Three formats meet here:
//! - chat messages posted by the caller in the request body
//! - openai messages/tools, sent from the agent to the model endpoint
//! - tool calls, sent from the agent to the tools assembled for the request
//!
//! Everything is converted into these internal structs at the edges, so the
//! agent loop only ever sees one shape.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
