//! Turns an agent SDK's stream-json messages into an ordered, de-duplicated
//! stream of UI message chunks.
//!
//! Feed each upstream message, in arrival order, to one [`Transformer`] per
//! session and forward the returned chunks before processing the next one.

pub mod chunks;
pub mod compact;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ids;
pub mod logging;
pub mod state;
pub mod tools;
pub mod trackers;
pub mod transformer;

pub use chunks::{MessageMetadata, UIMessageChunk};
pub use error::{EnhancerError, TransformError};
pub use events::SdkMessage;
pub use ids::make_composite_id;
pub use tools::{BashEnhancer, ToolEnhancer, ToolInputContext, ToolOutputContext, ToolRegistry};
pub use transformer::{TransformOptions, Transformer};
