//! Plugins compiled into the binary.

pub mod visible;

use novade_compositor_core::plugin::{Plugin, PluginDispatch};
use thiserror::Error;

pub use visible::VisiblePlugin;

pub const AVAILABLE: &[&str] = &[visible::NAME];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown plugin '{0}'")]
pub struct UnknownPlugin(pub String);

pub fn create(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        visible::NAME => Some(Box::new(VisiblePlugin::new())),
        _ => None,
    }
}

/// Builds the dispatch for the configured plugin names, keeping their order.
pub fn load<S: AsRef<str>>(names: &[S]) -> Result<PluginDispatch, UnknownPlugin> {
    let mut dispatch = PluginDispatch::new();
    for name in names {
        let name = name.as_ref();
        let plugin = create(name).ok_or_else(|| UnknownPlugin(name.to_string()))?;
        dispatch.register(plugin);
    }
    Ok(dispatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_keeps_order_and_rejects_unknown() {
        let dispatch = load(&["visible"]).unwrap();
        assert_eq!(dispatch.names(), vec!["visible"]);
        assert_eq!(load(&["visible", "shadows"]).err(), Some(UnknownPlugin("shadows".to_string())));
        assert!(load::<&str>(&[]).unwrap().is_empty());
    }
}
