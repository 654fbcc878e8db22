//! Core trait definitions shared across dmkit crates.

/// A type that can produce a summary of its contents.
pub trait Summarizable {
    /// A one-line summary suitable for display.
    fn summary(&self) -> String;
}

/// A type that carries a human-readable name.
pub trait Named {
    /// The name or identifier.
    fn name(&self) -> &str;
}
