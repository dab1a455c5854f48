use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// The two per-user catalogs a recipe can link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Tag,
    Ingredient,
}

impl CatalogKind {
    pub fn table(self) -> &'static str {
        match self {
            CatalogKind::Tag => "tags",
            CatalogKind::Ingredient => "ingredients",
        }
    }

    /// Association table joining recipes to this catalog.
    pub fn link_table(self) -> &'static str {
        match self {
            CatalogKind::Tag => "recipe_tags",
            CatalogKind::Ingredient => "recipe_ingredients",
        }
    }

    pub fn link_column(self) -> &'static str {
        match self {
            CatalogKind::Tag => "tag_id",
            CatalogKind::Ingredient => "ingredient_id",
        }
    }

    /// Name of the recipe payload field carrying ids of this kind.
    pub fn field(self) -> &'static str {
        match self {
            CatalogKind::Tag => "tags",
            CatalogKind::Ingredient => "ingredients",
        }
    }
}

/// A Tag or an Ingredient row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct CatalogItem {
    pub id: i64,
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogFilter {
    pub user_id: Uuid,
    /// Only items linked from at least one of the owner's recipes.
    pub assigned_only: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<i64>,        // sorted, unique
    pub ingredients: Vec<i64>, // sorted, unique
}

#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub user_id: Uuid,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<i64>,
    pub ingredients: Vec<i64>,
}

/// Partial update; `Some` associations replace the stored set.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

impl From<NewRecipe> for RecipeChanges {
    fn from(r: NewRecipe) -> Self {
        Self {
            title: Some(r.title),
            time_minutes: Some(r.time_minutes),
            price: Some(r.price),
            link: Some(r.link),
            tags: Some(r.tags),
            ingredients: Some(r.ingredients),
        }
    }
}
