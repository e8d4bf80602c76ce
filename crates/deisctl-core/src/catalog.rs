//! The set of components that make up a full platform install.

/// A platform component known to deisctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub name: &'static str,
    pub scalable: bool,
}

/// Platform components in install/start order: storage first, router last.
pub const PLATFORM: &[Component] = &[
    Component { name: "store-monitor", scalable: false },
    Component { name: "store-daemon", scalable: false },
    Component { name: "store-metadata", scalable: false },
    Component { name: "store-gateway", scalable: true },
    Component { name: "store-volume", scalable: false },
    Component { name: "logger", scalable: false },
    Component { name: "logspout", scalable: false },
    Component { name: "database", scalable: false },
    Component { name: "cache", scalable: false },
    Component { name: "registry", scalable: true },
    Component { name: "controller", scalable: false },
    Component { name: "builder", scalable: false },
    Component { name: "publisher", scalable: false },
    Component { name: "router", scalable: true },
];

/// Component whose instance count is driven by `--router-mesh-size`.
pub const ROUTER: &str = "router";

/// Token that stands for the whole platform on lifecycle commands.
pub const PLATFORM_TOKEN: &str = "platform";

pub fn lookup(name: &str) -> Option<&'static Component> {
    PLATFORM.iter().find(|c| c.name == name)
}

/// Only known scalable components may run more than one instance.
pub fn is_scalable(name: &str) -> bool {
    lookup(name).is_some_and(|c| c.scalable)
}

/// Position in platform order; unknown components sort last.
pub fn order(name: &str) -> usize {
    PLATFORM
        .iter()
        .position(|c| c.name == name)
        .unwrap_or(PLATFORM.len())
}

/// Unit definition file name for a component.
pub fn unit_file_name(component: &str) -> String {
    format!("deis-{component}.service")
}
