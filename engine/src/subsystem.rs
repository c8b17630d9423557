use crate::source::ObjectKind;
use std::str::FromStr as _;
use strum::{
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
};

/// Counter label for the per-target detail calls of the `lbvserver` subsystem.
pub const LBVSERVER_SVC_LABEL: &str = "lbvserver_svc";

/// A family of stats that is collected and exported together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Subsystem {
    LbVServer,
    Service,
}

impl Subsystem {
    pub fn object_kind(self) -> ObjectKind {
        match self {
            Self::LbVServer => ObjectKind::LbVServer,
            Self::Service => ObjectKind::Service,
        }
    }

    /// Resolves configured metric names, warning about (and dropping) names
    /// that do not match a known subsystem. Duplicates are registered once.
    pub fn resolve(names: &[String]) -> Vec<Self> {
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            match Self::from_str(name.trim()) {
                Ok(subsystem) if resolved.contains(&subsystem) => {
                    debug!(metric = %name, "metric already registered");
                }
                Ok(subsystem) => {
                    info!(metric = %name, "registering metric");
                    resolved.push(subsystem);
                }
                Err(_) => warn!(metric = %name, "invalid metric"),
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_are_lowercase_keys() {
        assert_eq!(Subsystem::LbVServer.to_string(), "lbvserver");
        assert_eq!(Subsystem::Service.as_ref(), "service");
        assert_eq!(Subsystem::from_str("lbvserver").unwrap(), Subsystem::LbVServer);
    }

    #[test]
    fn resolve_skips_unknown_and_duplicates() {
        let names = ["service", "gslbvserver", "lbvserver", "service"].map(String::from);
        assert_eq!(Subsystem::resolve(&names), vec![Subsystem::Service, Subsystem::LbVServer]);
    }
}
