pub mod frames;
pub mod identity;

// Re-export all models for easier imports
pub use frames::*;
pub use identity::*;
