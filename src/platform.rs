//! Host operating system and the tree categories it selects.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Detected operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// Linux, macOS and other Unix-like systems.
    Unix,
    /// Microsoft Windows.
    Windows,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix => write!(f, "unix"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// Top-level folder of a rendered template tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Files installed on every host.
    Common,
    /// Files installed on Unix-like hosts only.
    Unix,
    /// Files installed on Windows hosts only.
    Windows,
}

impl Category {
    /// Every category, in resolution order.
    pub const ALL: [Self; 3] = [Self::Common, Self::Unix, Self::Windows];

    /// Name of the folder holding this category in the rendered tree.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Unix => "unix",
            Self::Windows => "windows",
        }
    }

    /// Parse a folder name back into a category.
    #[must_use]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.dir_name() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Platform information for the current system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Operating system family.
    pub os: Os,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub const fn detect() -> Self {
        Self {
            os: Self::detect_os(),
        }
    }

    /// Create a platform with an explicit OS (tests and cross-host previews).
    #[must_use]
    pub const fn new(os: Os) -> Self {
        Self { os }
    }

    /// Whether this is a Unix-like host.
    #[must_use]
    pub const fn is_unix(&self) -> bool {
        matches!(self.os, Os::Unix)
    }

    /// Whether this is a Windows host.
    #[must_use]
    pub const fn is_windows(&self) -> bool {
        matches!(self.os, Os::Windows)
    }

    /// The OS-specific category active on this host.
    #[must_use]
    pub const fn host_category(&self) -> Category {
        match self.os {
            Os::Unix => Category::Unix,
            Os::Windows => Category::Windows,
        }
    }

    /// The OS-specific category that never applies on this host.
    #[must_use]
    pub const fn foreign_category(&self) -> Category {
        match self.os {
            Os::Unix => Category::Windows,
            Os::Windows => Category::Unix,
        }
    }

    /// Categories resolved on this host, in walk order.
    #[must_use]
    pub const fn active_categories(&self) -> [Category; 2] {
        [Category::Common, self.host_category()]
    }

    /// Whether a category applies on this host.
    #[must_use]
    pub fn includes(&self, category: Category) -> bool {
        category != self.foreign_category()
    }

    const fn detect_os() -> Os {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else {
            Os::Unix
        }
    }
}
