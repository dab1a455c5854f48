use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    recipe::{
        repo_types::{CatalogItem, Recipe},
        services::RecipeDetails,
    },
};

#[derive(Debug, Deserialize)]
pub struct CreateCatalogItemRequest {
    pub name: Option<String>,
}

/// Query string of the tag and ingredient listings.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub assigned_only: Option<String>,
}

impl CatalogQuery {
    pub fn assigned_only(&self) -> Result<bool, AppError> {
        match self.assigned_only.as_deref().map(str::trim) {
            None | Some("") | Some("0") | Some("false") => Ok(false),
            Some("1") | Some("true") => Ok(true),
            Some(_) => Err(AppError::field("assigned_only", "Must be 0 or 1.")),
        }
    }
}

/// Query string of the recipe listing: comma separated ids.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeQuery {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

impl RecipeQuery {
    pub fn tag_ids(&self) -> Result<Option<Vec<i64>>, AppError> {
        parse_ids("tags", self.tags.as_deref())
    }

    pub fn ingredient_ids(&self) -> Result<Option<Vec<i64>>, AppError> {
        parse_ids("ingredients", self.ingredients.as_deref())
    }
}

fn parse_ids(field: &str, raw: Option<&str>) -> Result<Option<Vec<i64>>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    raw.split(',')
        .map(|part| part.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
        .map_err(|_| AppError::field(field, "Expected a comma separated list of ids."))
}

/// Body of recipe create, replace and partial update.
#[derive(Debug, Default, Deserialize)]
pub struct RecipePayload {
    pub title: Option<String>,
    pub time_minutes: Option<i64>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct CatalogItemResponse {
    pub id: i64,
    pub name: String,
}

impl From<CatalogItem> for CatalogItemResponse {
    fn from(c: CatalogItem) -> Self {
        Self {
            id: c.id,
            name: c.name,
        }
    }
}

/// List representation: associations as ids.
#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: i64,
    pub title: String,
    pub ingredients: Vec<i64>,
    pub tags: Vec<i64>,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
}

impl From<Recipe> for RecipeResponse {
    fn from(r: Recipe) -> Self {
        Self {
            id: r.id,
            title: r.title,
            ingredients: r.ingredients,
            tags: r.tags,
            time_minutes: r.time_minutes,
            price: r.price,
            link: r.link,
        }
    }
}

/// Detail representation: associations nested.
#[derive(Debug, Serialize)]
pub struct RecipeDetailResponse {
    pub id: i64,
    pub title: String,
    pub ingredients: Vec<CatalogItemResponse>,
    pub tags: Vec<CatalogItemResponse>,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
}

impl From<RecipeDetails> for RecipeDetailResponse {
    fn from(d: RecipeDetails) -> Self {
        Self {
            id: d.recipe.id,
            title: d.recipe.title,
            ingredients: d.ingredients.into_iter().map(Into::into).collect(),
            tags: d.tags.into_iter().map(Into::into).collect(),
            time_minutes: d.recipe.time_minutes,
            price: d.recipe.price,
            link: d.recipe.link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigned_only_accepts_flags() {
        let q = |v: Option<&str>| CatalogQuery {
            assigned_only: v.map(String::from),
        };
        assert!(!q(None).assigned_only().unwrap());
        assert!(!q(Some("0")).assigned_only().unwrap());
        assert!(q(Some("1")).assigned_only().unwrap());
        assert!(q(Some("true")).assigned_only().unwrap());
        assert!(q(Some("yes please")).assigned_only().is_err());
    }

    #[test]
    fn recipe_query_parses_id_lists() {
        let q = RecipeQuery {
            tags: Some("3, 1".into()),
            ingredients: Some("x".into()),
        };
        assert_eq!(q.tag_ids().unwrap(), Some(vec![3, 1]));
        assert!(q.ingredient_ids().is_err());
        assert_eq!(RecipeQuery::default().tag_ids().unwrap(), None);
    }

    #[test]
    fn price_is_rendered_as_string() {
        let payload: RecipePayload =
            serde_json::from_str(r#"{"title": "Soup", "price": 5.5}"#).unwrap();
        assert_eq!(payload.price, Some(Decimal::new(55, 1)));

        let mut price = Decimal::new(5, 0);
        price.rescale(2);
        let json = serde_json::to_value(RecipeResponse {
            id: 1,
            title: "Soup".into(),
            ingredients: vec![],
            tags: vec![],
            time_minutes: 10,
            price,
            link: String::new(),
        })
        .unwrap();
        assert_eq!(json["price"], "5.00");
    }
}
