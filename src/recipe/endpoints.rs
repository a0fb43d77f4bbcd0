use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::cache::RequestKey;
use crate::config::ApiConfig;

/// URL conventions of the recipe API, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct Endpoints {
  base: Url,
  lookup_path: String,
  lookup_prefix: String,
  image_prefix: String,
}

impl Endpoints {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid recipe API url {}: {}", config.base_url, e))?;
    if base.host_str().is_none() {
      return Err(eyre!("Recipe API url has no host: {}", config.base_url));
    }

    Ok(Self {
      base,
      lookup_path: config.lookup_path.clone(),
      lookup_prefix: config.lookup_prefix.clone(),
      image_prefix: config.image_prefix.clone(),
    })
  }

  /// Canonical lookup URL for a recipe, e.g. `.../lookup.php?i=52772`.
  pub fn lookup_url(&self, meal_id: &str) -> Result<Url> {
    let mut url = self
      .base
      .join(&self.lookup_path)
      .map_err(|e| eyre!("Invalid lookup path {}: {}", self.lookup_path, e))?;
    url.query_pairs_mut().clear().append_pair("i", meal_id);
    Ok(url)
  }

  /// Cache key the lookup endpoint's response is stored under.
  pub fn lookup_key(&self, meal_id: &str) -> Result<RequestKey> {
    Ok(RequestKey::get(self.lookup_url(meal_id)?.as_str()))
  }

  pub fn is_lookup(&self, url: &Url) -> bool {
    self.on_api_host(url) && url.path().starts_with(&self.lookup_prefix)
  }

  pub fn is_image(&self, url: &Url) -> bool {
    self.on_api_host(url) && url.path().starts_with(&self.image_prefix)
  }

  fn on_api_host(&self, url: &Url) -> bool {
    url.host_str() == self.base.host_str()
  }
}
