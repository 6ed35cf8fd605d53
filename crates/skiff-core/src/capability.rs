//! Capability sets attached to sandboxes by template type.

use crate::error::{Error, Result};
use crate::model::TemplateType;
use std::fmt;

/// A group of facades that can be attached to a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Contexts, files, filesystem and processes.
    CodeInterpreter,
    /// Browser automation, live-view URLs and recordings.
    Browser,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Self::CodeInterpreter => 1,
            Self::Browser => 1 << 1,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeInterpreter => f.write_str("code-interpreter"),
            Self::Browser => f.write_str("browser"),
        }
    }
}

/// Set of capabilities attached to one sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Capabilities attached for a template type. All-in-one is the union.
    pub fn for_template(template_type: TemplateType) -> Self {
        match template_type {
            TemplateType::CodeInterpreter => Self::empty().with(Capability::CodeInterpreter),
            TemplateType::Browser => Self::empty().with(Capability::Browser),
            TemplateType::Aio => Self::empty()
                .with(Capability::CodeInterpreter)
                .with(Capability::Browser),
        }
    }

    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub const fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        [Capability::CodeInterpreter, Capability::Browser]
            .into_iter()
            .filter(|c| self.contains(*c))
    }

    /// Fail with [`Error::InvalidState`] unless `capability` is attached.
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.contains(capability) {
            return Ok(());
        }
        let attached: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        Err(Error::invalid_state(
            format!("{capability} capability"),
            format!("[{}]", attached.join(", ")),
        ))
    }
}
