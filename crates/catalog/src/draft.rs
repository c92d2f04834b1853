use serde::{Deserialize, Serialize};

use saber_core::{DomainError, DomainResult};

use crate::item::ItemMetadata;

/// Everything a depositor supplies about an item before it enters the catalog.
///
/// Title and author are required; the rest is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub title: String,
    pub author: String,
    pub category: Option<String>,
    pub metadata: ItemMetadata,
}

impl ItemDraft {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            category: None,
            metadata: ItemMetadata::default(),
        }
    }

    pub fn with_category(mut self, name: impl Into<String>) -> Self {
        self.category = Some(name.into());
        self
    }

    pub fn with_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.metadata.isbn = Some(isbn.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.metadata.summary = Some(summary.into());
        self
    }

    pub fn with_cover_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.cover_url = Some(url.into());
        self
    }

    pub fn with_publication_year(mut self, year: i32) -> Self {
        self.metadata.publication_year = Some(year);
        self
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.metadata.pages = Some(pages);
        self
    }

    /// Trim text fields and reject drafts missing a title or author.
    ///
    /// A blank category name is treated as no category.
    pub fn validate(mut self) -> DomainResult<Self> {
        self.title = self.title.trim().to_string();
        self.author = self.author.trim().to_string();
        if self.title.is_empty() {
            return Err(DomainError::validation("title cannot be empty"));
        }
        if self.author.is_empty() {
            return Err(DomainError::validation("author cannot be empty"));
        }
        self.category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if self.metadata.pages == Some(0) {
            return Err(DomainError::validation("pages must be positive"));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_title_is_rejected() {
        let err = ItemDraft::new("   ", "Machado de Assis").validate().unwrap_err();
        assert_eq!(err, DomainError::validation("title cannot be empty"));
    }

    #[test]
    fn trims_fields_and_drops_blank_category() {
        let draft = ItemDraft::new("  Iracema ", " José de Alencar")
            .with_category("  ")
            .with_pages(180)
            .validate()
            .unwrap();
        assert_eq!(draft.title, "Iracema");
        assert_eq!(draft.author, "José de Alencar");
        assert_eq!(draft.category, None);
        assert_eq!(draft.metadata.pages, Some(180));
    }
}
