use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    error::{too_long, AppError, FieldErrors, BLANK, MAX_NAME_LEN, REQUIRED},
    recipe::{
        dto::RecipePayload,
        repo_types::{
            CatalogFilter, CatalogItem, CatalogKind, NewRecipe, Recipe, RecipeChanges,
            RecipeFilter,
        },
    },
    store::Store,
};

const NON_NEGATIVE: &str = "Ensure this value is greater than or equal to 0.";
const PRICE_DECIMAL_PLACES: u32 = 2;
const PRICE_MAX_DIGITS: u32 = 5;

// ---- catalog (tags, ingredients) ----

#[instrument(skip(store))]
pub async fn list_catalog(
    store: &dyn Store,
    kind: CatalogKind,
    user_id: Uuid,
    assigned_only: bool,
) -> Result<Vec<CatalogItem>, AppError> {
    let filter = CatalogFilter {
        user_id,
        assigned_only,
    };
    Ok(store.list_catalog(kind, filter).await?)
}

#[instrument(skip(store))]
pub async fn create_catalog_item(
    store: &dyn Store,
    kind: CatalogKind,
    user_id: Uuid,
    name: Option<&str>,
) -> Result<CatalogItem, AppError> {
    let name = match name.map(str::trim) {
        None => return Err(AppError::field("name", REQUIRED)),
        Some("") => return Err(AppError::field("name", BLANK)),
        Some(n) if n.chars().count() > MAX_NAME_LEN => {
            return Err(AppError::field("name", too_long(MAX_NAME_LEN)))
        }
        Some(n) => n,
    };

    let item = store.insert_catalog_item(kind, user_id, name).await?;
    info!(kind = kind.table(), id = item.id, %user_id, "catalog item created");
    Ok(item)
}

// ---- recipes ----

/// A recipe with its associations resolved to full rows.
#[derive(Debug, Clone)]
pub struct RecipeDetails {
    pub recipe: Recipe,
    pub tags: Vec<CatalogItem>,
    pub ingredients: Vec<CatalogItem>,
}

#[instrument(skip(store))]
pub async fn list_recipes(
    store: &dyn Store,
    user_id: Uuid,
    tags: Option<Vec<i64>>,
    ingredients: Option<Vec<i64>>,
) -> Result<Vec<Recipe>, AppError> {
    let filter = RecipeFilter {
        user_id,
        tags,
        ingredients,
    };
    Ok(store.list_recipes(&filter).await?)
}

#[instrument(skip(store))]
pub async fn retrieve_recipe(
    store: &dyn Store,
    user_id: Uuid,
    id: i64,
) -> Result<RecipeDetails, AppError> {
    let recipe = store
        .find_recipe(user_id, id)
        .await?
        .ok_or(AppError::NotFound)?;
    details(store, recipe).await
}

#[instrument(skip(store, payload))]
pub async fn create_recipe(
    store: &dyn Store,
    user_id: Uuid,
    payload: RecipePayload,
) -> Result<Recipe, AppError> {
    let new_recipe = validate_full(store, user_id, payload).await?;
    let recipe = store.insert_recipe(user_id, new_recipe).await?;
    info!(recipe_id = recipe.id, %user_id, "recipe created");
    Ok(recipe)
}

/// Full update: scalar fields are required, omitted associations are cleared.
#[instrument(skip(store, payload))]
pub async fn replace_recipe(
    store: &dyn Store,
    user_id: Uuid,
    id: i64,
    payload: RecipePayload,
) -> Result<RecipeDetails, AppError> {
    ensure_owned(store, user_id, id).await?;
    let changes = RecipeChanges::from(validate_full(store, user_id, payload).await?);
    apply_update(store, user_id, id, changes).await
}

#[instrument(skip(store, payload))]
pub async fn update_recipe(
    store: &dyn Store,
    user_id: Uuid,
    id: i64,
    payload: RecipePayload,
) -> Result<RecipeDetails, AppError> {
    ensure_owned(store, user_id, id).await?;
    let changes = validate_partial(store, user_id, payload).await?;
    apply_update(store, user_id, id, changes).await
}

#[instrument(skip(store))]
pub async fn delete_recipe(store: &dyn Store, user_id: Uuid, id: i64) -> Result<(), AppError> {
    if !store.delete_recipe(user_id, id).await? {
        return Err(AppError::NotFound);
    }
    info!(recipe_id = id, %user_id, "recipe deleted");
    Ok(())
}

async fn ensure_owned(store: &dyn Store, user_id: Uuid, id: i64) -> Result<(), AppError> {
    match store.find_recipe(user_id, id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound),
    }
}

async fn apply_update(
    store: &dyn Store,
    user_id: Uuid,
    id: i64,
    changes: RecipeChanges,
) -> Result<RecipeDetails, AppError> {
    let recipe = store
        .update_recipe(user_id, id, changes)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(recipe_id = id, %user_id, "recipe updated");
    details(store, recipe).await
}

async fn details(store: &dyn Store, recipe: Recipe) -> Result<RecipeDetails, AppError> {
    let tags = store
        .catalog_items_by_ids(CatalogKind::Tag, &recipe.tags)
        .await?;
    let ingredients = store
        .catalog_items_by_ids(CatalogKind::Ingredient, &recipe.ingredients)
        .await?;
    Ok(RecipeDetails {
        recipe,
        tags,
        ingredients,
    })
}

// ---- validation ----

fn check_title(title: &str, errors: &mut FieldErrors) -> String {
    let title = title.trim();
    if title.is_empty() {
        errors.add("title", BLANK);
    } else if title.chars().count() > MAX_NAME_LEN {
        errors.add("title", too_long(MAX_NAME_LEN));
    }
    title.to_string()
}

fn check_time(minutes: i64, errors: &mut FieldErrors) -> i32 {
    if minutes < 0 {
        errors.add("time_minutes", NON_NEGATIVE);
        return 0;
    }
    match i32::try_from(minutes) {
        Ok(m) => m,
        Err(_) => {
            errors.add(
                "time_minutes",
                format!("Ensure this value is less than or equal to {}.", i32::MAX),
            );
            0
        }
    }
}

/// Price is a NUMERIC(5, 2): non-negative, two decimal places, below 1000.
fn check_price(price: Decimal, errors: &mut FieldErrors) -> Decimal {
    if price.is_sign_negative() && !price.is_zero() {
        errors.add("price", NON_NEGATIVE);
    }
    if price.normalize().scale() > PRICE_DECIMAL_PLACES {
        errors.add(
            "price",
            format!(
                "Ensure that there are no more than {} decimal places.",
                PRICE_DECIMAL_PLACES
            ),
        );
    }
    if price.abs() >= Decimal::new(10_i64.pow(PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES), 0) {
        errors.add(
            "price",
            format!(
                "Ensure that there are no more than {} digits in total.",
                PRICE_MAX_DIGITS
            ),
        );
    }
    let mut price = price.abs();
    price.rescale(PRICE_DECIMAL_PLACES);
    price
}

fn check_link(link: &str, errors: &mut FieldErrors) -> String {
    let link = link.trim();
    if link.chars().count() > MAX_NAME_LEN {
        errors.add("link", too_long(MAX_NAME_LEN));
    }
    link.to_string()
}

/// Association ids must exist. Ownership is not checked: a recipe may
/// reference another user's tags or ingredients.
async fn check_links(
    store: &dyn Store,
    user_id: Uuid,
    kind: CatalogKind,
    ids: Vec<i64>,
    errors: &mut FieldErrors,
) -> Result<Vec<i64>, AppError> {
    let ids: Vec<i64> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    let found = store.catalog_items_by_ids(kind, &ids).await?;

    for id in &ids {
        if !found.iter().any(|item| item.id == *id) {
            errors.add(
                kind.field(),
                format!("Invalid pk \"{}\" - object does not exist.", id),
            );
        }
    }
    if found.iter().any(|item| item.user_id != user_id) {
        debug!(kind = kind.table(), %user_id, "recipe links items owned by another user");
    }
    Ok(ids)
}

async fn validate_full(
    store: &dyn Store,
    user_id: Uuid,
    payload: RecipePayload,
) -> Result<NewRecipe, AppError> {
    let mut errors = FieldErrors::new();

    let title = match payload.title {
        Some(t) => check_title(&t, &mut errors),
        None => {
            errors.add("title", REQUIRED);
            String::new()
        }
    };
    let time_minutes = match payload.time_minutes {
        Some(m) => check_time(m, &mut errors),
        None => {
            errors.add("time_minutes", REQUIRED);
            0
        }
    };
    let price = match payload.price {
        Some(p) => check_price(p, &mut errors),
        None => {
            errors.add("price", REQUIRED);
            Decimal::ZERO
        }
    };
    let link = payload
        .link
        .map(|l| check_link(&l, &mut errors))
        .unwrap_or_default();
    let tags = check_links(
        store,
        user_id,
        CatalogKind::Tag,
        payload.tags.unwrap_or_default(),
        &mut errors,
    )
    .await?;
    let ingredients = check_links(
        store,
        user_id,
        CatalogKind::Ingredient,
        payload.ingredients.unwrap_or_default(),
        &mut errors,
    )
    .await?;

    errors.into_result()?;
    Ok(NewRecipe {
        title,
        time_minutes,
        price,
        link,
        tags,
        ingredients,
    })
}

async fn validate_partial(
    store: &dyn Store,
    user_id: Uuid,
    payload: RecipePayload,
) -> Result<RecipeChanges, AppError> {
    let mut errors = FieldErrors::new();

    let title = payload.title.map(|t| check_title(&t, &mut errors));
    let time_minutes = payload.time_minutes.map(|m| check_time(m, &mut errors));
    let price = payload.price.map(|p| check_price(p, &mut errors));
    let link = payload.link.map(|l| check_link(&l, &mut errors));
    let tags = match payload.tags {
        Some(ids) => Some(check_links(store, user_id, CatalogKind::Tag, ids, &mut errors).await?),
        None => None,
    };
    let ingredients = match payload.ingredients {
        Some(ids) => Some(
            check_links(store, user_id, CatalogKind::Ingredient, ids, &mut errors).await?,
        ),
        None => None,
    };

    errors.into_result()?;
    Ok(RecipeChanges {
        title,
        time_minutes,
        price,
        link,
        tags,
        ingredients,
    })
}
