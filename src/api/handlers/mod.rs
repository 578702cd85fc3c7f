pub mod pipeline;
pub mod system;
