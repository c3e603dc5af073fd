mod builder;
mod config;
mod node;
mod view;
mod writer;

pub use builder::{IndexBuilder, IndexRoot};
pub use config::IndexBuilderConfig;
pub use node::{Child, CHILD_SIZE, HEADER_SIZE, OFFSET_SIZE};
pub use view::NodePage;
pub use writer::NodeWriter;
