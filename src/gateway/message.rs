//! Typed message protocol from the UI to the gateway.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use crate::recipe::Meal;

/// Closed set of messages the gateway accepts.
///
/// Wire form is JSON with a `type` discriminant, e.g.
/// `{"type":"REMOVE_CACHED_RECIPE","recipeId":"52772"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayMessage {
  /// Seed the recipe partition (and best-effort the image partition)
  CacheRecipe { recipe: Meal },
  /// Seed each recipe independently
  CacheRecipes { recipes: Vec<Meal> },
  /// Evict the recipe partition entry; the image is kept
  RemoveCachedRecipe {
    #[serde(rename = "recipeId")]
    recipe_id: String,
  },
}

impl GatewayMessage {
  pub fn from_json(raw: &str) -> Result<Self> {
    serde_json::from_str(raw).map_err(|e| eyre!("Invalid gateway message: {}", e))
  }

  pub fn to_json(&self) -> Result<String> {
    serde_json::to_string(self).map_err(|e| eyre!("Failed to encode gateway message: {}", e))
  }
}
