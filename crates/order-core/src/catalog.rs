//! # Item Catalog
//!
//! Read-only menu lookups used by the pricing calculator.
//! The default `MenuCatalog` is loaded from `config/menu.toml`.

use crate::error::OrderResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A priced add-on for a menu item (extra cheese, large size, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogModifier {
    pub id: String,
    pub name: String,
    /// Price change in cents (may be negative)
    #[serde(default)]
    pub price_delta_cents: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// A menu item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Unique item identifier (e.g., "margherita-12")
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Base price in cents
    pub price_cents: i64,

    /// Kitchen preparation time
    #[serde(default)]
    pub prep_minutes: u32,

    /// Whether this item can currently be ordered
    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub modifiers: Vec<CatalogModifier>,
}

fn default_true() -> bool {
    true
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price_cents: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            price_cents,
            prep_minutes: 0,
            active: true,
            modifiers: Vec::new(),
        }
    }

    /// Builder: set prep time
    pub fn with_prep_minutes(mut self, minutes: u32) -> Self {
        self.prep_minutes = minutes;
        self
    }

    /// Builder: add a modifier
    pub fn with_modifier(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        price_delta_cents: i64,
    ) -> Self {
        self.modifiers.push(CatalogModifier {
            id: id.into(),
            name: name.into(),
            price_delta_cents,
            active: true,
        });
        self
    }

    /// Builder: mark unavailable
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Find an active modifier belonging to this item
    pub fn modifier(&self, modifier_id: &str) -> Option<&CatalogModifier> {
        self.modifiers
            .iter()
            .find(|m| m.id == modifier_id && m.active)
    }
}

/// Item Catalog collaborator: `id -> item with modifiers`
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Returns the item regardless of its `active` flag; the caller decides.
    async fn get_item(&self, item_id: &str) -> OrderResult<Option<CatalogItem>>;
}

/// Menu loaded from config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MenuCatalog {
    #[serde(default)]
    pub items: Vec<CatalogItem>,
}

impl MenuCatalog {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn add(&mut self, item: CatalogItem) {
        self.items.push(item);
    }

    pub fn with_item(mut self, item: CatalogItem) -> Self {
        self.add(item);
        self
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn active_items(&self) -> impl Iterator<Item = &CatalogItem> {
        self.items.iter().filter(|i| i.active)
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

#[async_trait]
impl ItemCatalog for MenuCatalog {
    async fn get_item(&self, item_id: &str) -> OrderResult<Option<CatalogItem>> {
        Ok(self.get(item_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_from_toml() {
        let menu = MenuCatalog::from_toml(
            r#"
            [[items]]
            id = "margherita"
            name = "Margherita"
            price_cents = 1200
            prep_minutes = 15

            [[items.modifiers]]
            id = "extra-cheese"
            name = "Extra cheese"
            price_delta_cents = 150

            [[items]]
            id = "tiramisu"
            name = "Tiramisu"
            price_cents = 700
            active = false
            "#,
        )
        .unwrap();

        assert_eq!(menu.items.len(), 2);
        let pizza = menu.get("margherita").unwrap();
        assert_eq!(pizza.prep_minutes, 15);
        assert_eq!(pizza.modifier("extra-cheese").unwrap().price_delta_cents, 150);
        assert_eq!(menu.active_items().count(), 1);
    }

    #[test]
    fn test_inactive_modifier_is_hidden() {
        let mut item = CatalogItem::new("burger", "Burger", 1000).with_modifier("bacon", "Bacon", 200);
        item.modifiers[0].active = false;
        assert!(item.modifier("bacon").is_none());
    }
}
