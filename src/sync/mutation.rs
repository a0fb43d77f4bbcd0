//! User mutations that can be applied locally and replayed later.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::recipe::Meal;

/// Local-state mutators owned by the application.
///
/// This is the narrow capability the offline layer needs: the coordinator
/// replays through it and the facade applies optimistic updates through it.
/// Implementations should be idempotent, since a replayed mutation may
/// already be reflected in local state.
pub trait AppStateMutator: Send + Sync {
  fn add_favorite(&self, meal: &Meal) -> Result<()>;
  fn remove_favorite(&self, meal_id: &str) -> Result<()>;
  fn mark_as_cooked(&self, meal: &Meal) -> Result<()>;
  fn add_to_meal_plan(&self, day: &str, meal: &Meal) -> Result<()>;
  fn remove_from_meal_plan(&self, day: &str, meal_id: &str) -> Result<()>;
}

/// Discriminant of a [`Mutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
  AddFavorite,
  RemoveFavorite,
  MarkCooked,
  AddToPlan,
  RemoveFromPlan,
}

impl MutationKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::AddFavorite => "ADD_FAVORITE",
      Self::RemoveFavorite => "REMOVE_FAVORITE",
      Self::MarkCooked => "MARK_COOKED",
      Self::AddToPlan => "ADD_TO_PLAN",
      Self::RemoveFromPlan => "REMOVE_FROM_PLAN",
    }
  }
}

impl fmt::Display for MutationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A mutation together with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mutation {
  AddFavorite { meal: Meal },
  RemoveFavorite { meal_id: String },
  MarkCooked { meal: Meal },
  AddToPlan { day: String, meal: Meal },
  RemoveFromPlan { day: String, meal_id: String },
}

impl Mutation {
  pub fn kind(&self) -> MutationKind {
    match self {
      Self::AddFavorite { .. } => MutationKind::AddFavorite,
      Self::RemoveFavorite { .. } => MutationKind::RemoveFavorite,
      Self::MarkCooked { .. } => MutationKind::MarkCooked,
      Self::AddToPlan { .. } => MutationKind::AddToPlan,
      Self::RemoveFromPlan { .. } => MutationKind::RemoveFromPlan,
    }
  }

  /// The meal this mutation carries, for kinds that reference a full recipe.
  pub fn meal(&self) -> Option<&Meal> {
    match self {
      Self::AddFavorite { meal } | Self::MarkCooked { meal } | Self::AddToPlan { meal, .. } => {
        Some(meal)
      }
      Self::RemoveFavorite { .. } | Self::RemoveFromPlan { .. } => None,
    }
  }

  pub fn meal_id(&self) -> &str {
    match self {
      Self::AddFavorite { meal } | Self::MarkCooked { meal } | Self::AddToPlan { meal, .. } => {
        &meal.id
      }
      Self::RemoveFavorite { meal_id } | Self::RemoveFromPlan { meal_id, .. } => meal_id,
    }
  }

  /// Dispatch to the matching local-state mutator.
  pub fn apply(&self, state: &dyn AppStateMutator) -> Result<()> {
    match self {
      Self::AddFavorite { meal } => state.add_favorite(meal),
      Self::RemoveFavorite { meal_id } => state.remove_favorite(meal_id),
      Self::MarkCooked { meal } => state.mark_as_cooked(meal),
      Self::AddToPlan { day, meal } => state.add_to_meal_plan(day, meal),
      Self::RemoveFromPlan { day, meal_id } => state.remove_from_meal_plan(day, meal_id),
    }
  }
}

/// An entry in the mutation queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMutation {
  pub sequence: u64,
  pub mutation: Mutation,
  pub enqueued_at: DateTime<Utc>,
  /// Failed replay attempts so far
  pub attempts: u32,
  pub last_error: Option<String>,
}

impl QueuedMutation {
  pub fn kind(&self) -> MutationKind {
    self.mutation.kind()
  }
}
