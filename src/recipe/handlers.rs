use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::dto::{
    CatalogItemResponse, CatalogQuery, CreateCatalogItemRequest, RecipeDetailResponse,
    RecipePayload, RecipeQuery, RecipeResponse,
};
use super::{repo_types::CatalogKind, services};
use crate::{error::AppError, state::AppState, user::extractors::AuthUser};

type JsonBody<T> = Result<Json<T>, JsonRejection>;

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/recipe/tags", get(list_tags).post(create_tag))
        .route(
            "/recipe/ingredients",
            get(list_ingredients).post(create_ingredient),
        )
}

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipe/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipe/recipes/:id",
            get(get_recipe)
                .put(replace_recipe)
                .patch(update_recipe)
                .delete(delete_recipe),
        )
}

// --- tags & ingredients ---

async fn list_catalog(
    state: &AppState,
    kind: CatalogKind,
    user_id: uuid::Uuid,
    query: Result<Query<CatalogQuery>, QueryRejection>,
) -> Result<Json<Vec<CatalogItemResponse>>, AppError> {
    let Query(query) = query?;
    let items = services::list_catalog(
        state.store.as_ref(),
        kind,
        user_id,
        query.assigned_only()?,
    )
    .await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

async fn create_catalog_item(
    state: &AppState,
    kind: CatalogKind,
    user_id: uuid::Uuid,
    payload: JsonBody<CreateCatalogItemRequest>,
) -> Result<(StatusCode, Json<CatalogItemResponse>), AppError> {
    let Json(payload) = payload?;
    let item = services::create_catalog_item(
        state.store.as_ref(),
        kind,
        user_id,
        payload.name.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

#[instrument(skip(state, query))]
pub async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    query: Result<Query<CatalogQuery>, QueryRejection>,
) -> Result<Json<Vec<CatalogItemResponse>>, AppError> {
    list_catalog(&state, CatalogKind::Tag, user_id, query).await
}

#[instrument(skip(state, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: JsonBody<CreateCatalogItemRequest>,
) -> Result<(StatusCode, Json<CatalogItemResponse>), AppError> {
    create_catalog_item(&state, CatalogKind::Tag, user_id, payload).await
}

#[instrument(skip(state, query))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    query: Result<Query<CatalogQuery>, QueryRejection>,
) -> Result<Json<Vec<CatalogItemResponse>>, AppError> {
    list_catalog(&state, CatalogKind::Ingredient, user_id, query).await
}

#[instrument(skip(state, payload))]
pub async fn create_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: JsonBody<CreateCatalogItemRequest>,
) -> Result<(StatusCode, Json<CatalogItemResponse>), AppError> {
    create_catalog_item(&state, CatalogKind::Ingredient, user_id, payload).await
}

// --- recipes ---

#[instrument(skip(state, query))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    query: Result<Query<RecipeQuery>, QueryRejection>,
) -> Result<Json<Vec<RecipeResponse>>, AppError> {
    let Query(query) = query?;
    let recipes = services::list_recipes(
        state.store.as_ref(),
        user_id,
        query.tag_ids()?,
        query.ingredient_ids()?,
    )
    .await?;
    Ok(Json(recipes.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: JsonBody<RecipePayload>,
) -> Result<(StatusCode, Json<RecipeResponse>), AppError> {
    let Json(payload) = payload?;
    let recipe = services::create_recipe(state.store.as_ref(), user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(recipe.into())))
}

#[instrument(skip(state, id))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    let Path(id) = id?;
    let details = services::retrieve_recipe(state.store.as_ref(), user_id, id).await?;
    Ok(Json(details.into()))
}

#[instrument(skip(state, id, payload))]
pub async fn replace_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
    payload: JsonBody<RecipePayload>,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let details = services::replace_recipe(state.store.as_ref(), user_id, id, payload).await?;
    Ok(Json(details.into()))
}

#[instrument(skip(state, id, payload))]
pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
    payload: JsonBody<RecipePayload>,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let details = services::update_recipe(state.store.as_ref(), user_id, id, payload).await?;
    Ok(Json(details.into()))
}

#[instrument(skip(state, id))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    services::delete_recipe(state.store.as_ref(), user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
