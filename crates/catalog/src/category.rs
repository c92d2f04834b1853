use serde::{Deserialize, Serialize};

use saber_core::CategoryId;

/// Item category, unique by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
}

impl Category {
    /// A category created on the fly by a deposit naming it for the first time.
    pub fn for_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let description = format!("Books about {name}");
        Self {
            id: CategoryId::new(),
            name,
            description,
        }
    }
}
