//! Persistence seam. Business rules live in the `user` and `recipe`
//! services; implementations here only read and write rows.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::recipe::repo_types::{
    CatalogFilter, CatalogItem, CatalogKind, NewRecipe, Recipe, RecipeChanges, RecipeFilter,
};
use crate::user::repo_types::{AuthToken, NewUser, User, UserChanges};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn update_user(&self, id: Uuid, changes: UserChanges)
        -> Result<Option<User>, StoreError>;

    /// Returns the user's token, storing `candidate_key` only when none exists yet.
    async fn get_or_create_token(
        &self,
        user_id: Uuid,
        candidate_key: &str,
    ) -> Result<AuthToken, StoreError>;
    async fn find_token(&self, key: &str) -> Result<Option<AuthToken>, StoreError>;

    /// Owner's items ordered by name descending, then id descending.
    async fn list_catalog(
        &self,
        kind: CatalogKind,
        filter: CatalogFilter,
    ) -> Result<Vec<CatalogItem>, StoreError>;
    async fn insert_catalog_item(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
        name: &str,
    ) -> Result<CatalogItem, StoreError>;
    /// Unscoped lookup ordered by id; ids that do not exist are skipped.
    async fn catalog_items_by_ids(
        &self,
        kind: CatalogKind,
        ids: &[i64],
    ) -> Result<Vec<CatalogItem>, StoreError>;

    /// Owner's recipes ordered by id descending.
    async fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>, StoreError>;
    async fn find_recipe(&self, user_id: Uuid, id: i64) -> Result<Option<Recipe>, StoreError>;
    async fn insert_recipe(&self, user_id: Uuid, recipe: NewRecipe) -> Result<Recipe, StoreError>;
    async fn update_recipe(
        &self,
        user_id: Uuid,
        id: i64,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, StoreError>;
    async fn delete_recipe(&self, user_id: Uuid, id: i64) -> Result<bool, StoreError>;
}
