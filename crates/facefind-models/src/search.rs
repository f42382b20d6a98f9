//! Identity search target.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which identity a run is looking for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "class_index", rename_all = "snake_case")]
pub enum SearchTarget {
    /// Open search: log every sufficiently confident identity.
    #[default]
    Any,
    /// Specific identity, by classifier class index.
    Class(usize),
}

impl SearchTarget {
    /// Interpret the command-line id, where any negative value means "any".
    pub fn from_id(id: i64) -> Self {
        if id < 0 {
            SearchTarget::Any
        } else {
            SearchTarget::Class(id as usize)
        }
    }
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchTarget::Any => write!(f, "any"),
            SearchTarget::Class(index) => write!(f, "class {}", index),
        }
    }
}
