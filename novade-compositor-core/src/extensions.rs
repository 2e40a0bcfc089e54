//! Display extension capabilities.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{CompositorError, TransportError};
use crate::protocol::ExtensionInfo;
use crate::transport::{Cookie, Transport, TransportExt};

pub const COMPOSITE: &str = "Composite";
pub const DAMAGE: &str = "DAMAGE";
pub const XFIXES: &str = "XFIXES";
pub const SHAPE: &str = "SHAPE";
pub const RANDR: &str = "RANDR";

struct Requirement {
    name: &'static str,
    required: bool,
    minimum: (u32, u32),
}

const REQUIREMENTS: [Requirement; 5] = [
    Requirement {
        name: COMPOSITE,
        required: true,
        minimum: (0, 2),
    },
    Requirement {
        name: DAMAGE,
        required: true,
        minimum: (1, 0),
    },
    Requirement {
        name: XFIXES,
        required: true,
        minimum: (2, 0),
    },
    Requirement {
        name: SHAPE,
        required: false,
        minimum: (1, 0),
    },
    Requirement {
        name: RANDR,
        required: false,
        minimum: (1, 0),
    },
];

/// Extensions the server offers, as far as the compositor cares.
#[derive(Debug, Clone, Default)]
pub struct Extensions {
    entries: BTreeMap<&'static str, ExtensionInfo>,
}

/// Extension queries in flight.
#[derive(Debug)]
pub struct PendingExtensions {
    cookies: Vec<(&'static str, Cookie<ExtensionInfo>)>,
}

impl Extensions {
    /// Issues one query per known extension without waiting for replies.
    pub fn request<T: Transport + ?Sized>(transport: &mut T) -> Result<PendingExtensions, TransportError> {
        let cookies = REQUIREMENTS
            .iter()
            .map(|req| Ok((req.name, transport.query_extension(req.name)?)))
            .collect::<Result<Vec<_>, TransportError>>()?;
        Ok(PendingExtensions { cookies })
    }

    pub fn insert(&mut self, name: &'static str, info: ExtensionInfo) {
        self.entries.insert(name, info);
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.entries.get(name).map_or(false, |info| info.present)
    }

    pub fn version(&self, name: &str) -> Option<(u32, u32)> {
        self.entries
            .get(name)
            .filter(|info| info.present)
            .map(|info| (info.major_version, info.minor_version))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl PendingExtensions {
    /// Collects the replies. A missing or too old required extension is fatal;
    /// missing optional ones are only reported.
    pub fn finalize<T: Transport + ?Sized>(self, transport: &mut T) -> Result<Extensions, CompositorError> {
        let mut extensions = Extensions::default();
        for (name, cookie) in self.cookies {
            let info = cookie.finalize(transport)?;
            extensions.insert(name, info);
        }
        for req in &REQUIREMENTS {
            let usable = extensions.version(req.name).map_or(false, |version| version >= req.minimum);
            match (usable, req.required) {
                (true, _) => debug!(extension = req.name, version = ?extensions.version(req.name), "Extension available"),
                (false, true) => return Err(CompositorError::MissingExtension(req.name)),
                (false, false) => {
                    warn!(extension = req.name, "Optional extension unavailable");
                    extensions.entries.remove(req.name);
                }
            }
        }
        Ok(extensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use rstest::rstest;

    #[test]
    fn test_all_extensions_present() {
        let mut transport = ScriptedTransport::new();
        let pending = Extensions::request(&mut transport).unwrap();
        let extensions = pending.finalize(&mut transport).unwrap();
        assert!(extensions.is_present(COMPOSITE));
        assert!(extensions.is_present(RANDR));
        assert_eq!(extensions.version(COMPOSITE), Some((0, 4)));
    }

    #[rstest]
    #[case(COMPOSITE)]
    #[case(DAMAGE)]
    #[case(XFIXES)]
    fn test_missing_required_extension_is_fatal(#[case] name: &'static str) {
        let mut transport = ScriptedTransport::new();
        transport.server().borrow_mut().extensions.remove(name);
        let pending = Extensions::request(&mut transport).unwrap();
        match pending.finalize(&mut transport) {
            Err(CompositorError::MissingExtension(missing)) => assert_eq!(missing, name),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_old_composite_is_rejected() {
        let mut transport = ScriptedTransport::new();
        transport.server().borrow_mut().extensions.insert(
            COMPOSITE.to_string(),
            ExtensionInfo {
                present: true,
                major_version: 0,
                minor_version: 1,
            },
        );
        let pending = Extensions::request(&mut transport).unwrap();
        assert!(matches!(
            pending.finalize(&mut transport),
            Err(CompositorError::MissingExtension(COMPOSITE))
        ));
    }

    #[test]
    fn test_missing_optional_extension_is_tolerated() {
        let mut transport = ScriptedTransport::new();
        transport.server().borrow_mut().extensions.remove(RANDR);
        let pending = Extensions::request(&mut transport).unwrap();
        let extensions = pending.finalize(&mut transport).unwrap();
        assert!(!extensions.is_present(RANDR));
        assert!(extensions.is_present(SHAPE));
    }
}
