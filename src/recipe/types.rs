//! Serde types matching the recipe API's lookup responses.
//!
//! Only the id and the thumbnail URL are interpreted here; every other field
//! is carried through untouched so a seeded lookup body matches what the UI
//! already holds.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A recipe as returned by the lookup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
  #[serde(rename = "idMeal")]
  pub id: String,
  #[serde(rename = "strMeal", default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(
    rename = "strMealThumb",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub image_url: Option<String>,
  // Ingredients, instructions, tags and the rest
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Meal {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: None,
      image_url: None,
      extra: Map::new(),
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_image(mut self, url: impl Into<String>) -> Self {
    self.image_url = Some(url.into());
    self
  }

  /// Image URL, ignoring blank values the API sometimes returns.
  pub fn image(&self) -> Option<&str> {
    self
      .image_url
      .as_deref()
      .map(str::trim)
      .filter(|url| !url.is_empty())
  }
}

/// Body of `lookup.php?i=<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse {
  pub meals: Option<Vec<Meal>>,
}

impl LookupResponse {
  /// The body the lookup endpoint would have returned for this meal.
  pub fn for_meal(meal: &Meal) -> Self {
    Self {
      meals: Some(vec![meal.clone()]),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unknown_fields_round_trip() {
    let raw = r#"{"idMeal":"52772","strMeal":"Teriyaki Chicken Casserole",
      "strMealThumb":"https://www.themealdb.com/images/media/meals/wvpsxx1468256321.jpg",
      "strCategory":"Chicken","strIngredient1":"soy sauce"}"#;
    let meal: Meal = serde_json::from_str(raw).unwrap();
    assert_eq!(meal.id, "52772");
    assert_eq!(meal.extra.get("strCategory"), Some(&Value::from("Chicken")));

    let json = serde_json::to_value(LookupResponse::for_meal(&meal)).unwrap();
    assert_eq!(json["meals"][0]["strIngredient1"], "soy sauce");
    assert_eq!(json["meals"][0]["idMeal"], "52772");
  }

  #[test]
  fn test_blank_image_is_ignored() {
    assert_eq!(Meal::new("1").with_image("  ").image(), None);
    assert_eq!(Meal::new("1").image(), None);
    assert_eq!(
      Meal::new("1").with_image("https://x/y.jpg").image(),
      Some("https://x/y.jpg")
    );
  }

  #[test]
  fn test_null_meals_parses() {
    let response: LookupResponse = serde_json::from_str(r#"{"meals":null}"#).unwrap();
    assert!(response.meals.is_none());
  }
}
