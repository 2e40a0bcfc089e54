//! Rendering backends compiled into the binary.

pub mod headless;

use novade_compositor_core::plugin::RenderingBackend;

pub use headless::HeadlessBackend;

/// Names of the available backends.
pub const AVAILABLE: &[&str] = &[headless::NAME];

/// Instantiates the backend registered under `name`.
pub fn create(name: &str) -> Option<Box<dyn RenderingBackend>> {
    match name {
        headless::NAME => Some(Box::new(HeadlessBackend::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_by_name() {
        assert_eq!(create("headless").map(|b| b.name().to_string()), Some("headless".to_string()));
        assert!(create("opengl").is_none());
    }
}
