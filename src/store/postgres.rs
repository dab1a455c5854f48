use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::recipe::repo_types::{
    CatalogFilter, CatalogItem, CatalogKind, NewRecipe, Recipe, RecipeChanges, RecipeFilter,
};
use crate::user::repo_types::{AuthToken, NewUser, User, UserChanges};

const USER_COLUMNS: &str =
    "id, email, password_hash, name, is_active, is_staff, is_superuser, created_at";

const RECIPE_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.title, r.time_minutes, r.price, r.link,
           ARRAY(SELECT rt.tag_id FROM recipe_tags rt
                  WHERE rt.recipe_id = r.id ORDER BY rt.tag_id) AS tags,
           ARRAY(SELECT ri.ingredient_id FROM recipe_ingredients ri
                  WHERE ri.recipe_id = r.id ORDER BY ri.ingredient_id) AS ingredients
      FROM recipes r
"#;

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

fn map_unique(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
        }
    }
    StoreError::Database(e)
}

async fn replace_links(
    tx: &mut Transaction<'_, Postgres>,
    kind: CatalogKind,
    recipe_id: i64,
    ids: &[i64],
) -> Result<(), StoreError> {
    let delete = format!("DELETE FROM {} WHERE recipe_id = $1", kind.link_table());
    sqlx::query(&delete).bind(recipe_id).execute(&mut **tx).await?;

    if ids.is_empty() {
        return Ok(());
    }
    let insert = format!(
        "INSERT INTO {} (recipe_id, {}) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
        kind.link_table(),
        kind.link_column()
    );
    sqlx::query(&insert)
        .bind(recipe_id)
        .bind(ids)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, password_hash, name, is_active, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(user.is_active)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .fetch_one(&self.db)
            .await
            .map_err(map_unique)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   name = COALESCE($3, name),
                   password_hash = COALESCE($4, password_hash)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.email)
            .bind(changes.name)
            .bind(changes.password_hash)
            .fetch_optional(&self.db)
            .await
            .map_err(map_unique)
    }

    async fn get_or_create_token(
        &self,
        user_id: Uuid,
        candidate_key: &str,
    ) -> Result<AuthToken, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO auth_tokens (key, user_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(candidate_key)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        let token = sqlx::query_as::<_, AuthToken>(
            r#"SELECT key, user_id, created_at FROM auth_tokens WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(token)
    }

    async fn find_token(&self, key: &str) -> Result<Option<AuthToken>, StoreError> {
        let token = sqlx::query_as::<_, AuthToken>(
            r#"SELECT key, user_id, created_at FROM auth_tokens WHERE key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        Ok(token)
    }

    async fn list_catalog(
        &self,
        kind: CatalogKind,
        filter: CatalogFilter,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let sql = format!(
            r#"
            SELECT c.id, c.user_id, c.name
              FROM {table} c
             WHERE c.user_id = $1
               AND (NOT $2 OR EXISTS (
                        SELECT 1
                          FROM {link} l
                          JOIN recipes r ON r.id = l.recipe_id
                         WHERE l.{column} = c.id AND r.user_id = $1))
             ORDER BY c.name DESC, c.id DESC
            "#,
            table = kind.table(),
            link = kind.link_table(),
            column = kind.link_column(),
        );
        let rows = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(filter.user_id)
            .bind(filter.assigned_only)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn insert_catalog_item(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
        name: &str,
    ) -> Result<CatalogItem, StoreError> {
        let sql = format!(
            "INSERT INTO {} (user_id, name) VALUES ($1, $2) RETURNING id, user_id, name",
            kind.table()
        );
        let item = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(user_id)
            .bind(name)
            .fetch_one(&self.db)
            .await?;
        Ok(item)
    }

    async fn catalog_items_by_ids(
        &self,
        kind: CatalogKind,
        ids: &[i64],
    ) -> Result<Vec<CatalogItem>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, user_id, name FROM {} WHERE id = ANY($1) ORDER BY id",
            kind.table()
        );
        let rows = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(ids)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>, StoreError> {
        let sql = format!(
            r#"
            {RECIPE_SELECT}
             WHERE r.user_id = $1
               AND ($2::BIGINT[] IS NULL OR EXISTS (
                        SELECT 1 FROM recipe_tags rt
                         WHERE rt.recipe_id = r.id AND rt.tag_id = ANY($2)))
               AND ($3::BIGINT[] IS NULL OR EXISTS (
                        SELECT 1 FROM recipe_ingredients ri
                         WHERE ri.recipe_id = r.id AND ri.ingredient_id = ANY($3)))
             ORDER BY r.id DESC
            "#
        );
        let rows = sqlx::query_as::<_, Recipe>(&sql)
            .bind(filter.user_id)
            .bind(filter.tags.as_deref())
            .bind(filter.ingredients.as_deref())
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn find_recipe(&self, user_id: Uuid, id: i64) -> Result<Option<Recipe>, StoreError> {
        let sql = format!("{RECIPE_SELECT} WHERE r.id = $1 AND r.user_id = $2");
        let recipe = sqlx::query_as::<_, Recipe>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(recipe)
    }

    async fn insert_recipe(&self, user_id: Uuid, recipe: NewRecipe) -> Result<Recipe, StoreError> {
        let mut tx = self.db.begin().await?;
        let (id,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO recipes (user_id, title, time_minutes, price, link)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(&recipe.title)
        .bind(recipe.time_minutes)
        .bind(recipe.price)
        .bind(&recipe.link)
        .fetch_one(&mut *tx)
        .await?;

        replace_links(&mut tx, CatalogKind::Tag, id, &recipe.tags).await?;
        replace_links(&mut tx, CatalogKind::Ingredient, id, &recipe.ingredients).await?;
        tx.commit().await?;

        let sql = format!("{RECIPE_SELECT} WHERE r.id = $1");
        let created = sqlx::query_as::<_, Recipe>(&sql)
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        Ok(created)
    }

    async fn update_recipe(
        &self,
        user_id: Uuid,
        id: i64,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, StoreError> {
        let mut tx = self.db.begin().await?;
        let updated = sqlx::query_as::<_, (i64,)>(
            r#"
            UPDATE recipes
               SET title = COALESCE($3, title),
                   time_minutes = COALESCE($4, time_minutes),
                   price = COALESCE($5, price),
                   link = COALESCE($6, link)
             WHERE id = $1 AND user_id = $2
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(changes.title)
        .bind(changes.time_minutes)
        .bind(changes.price)
        .bind(changes.link)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Ok(None);
        }
        if let Some(tags) = &changes.tags {
            replace_links(&mut tx, CatalogKind::Tag, id, tags).await?;
        }
        if let Some(ingredients) = &changes.ingredients {
            replace_links(&mut tx, CatalogKind::Ingredient, id, ingredients).await?;
        }
        tx.commit().await?;

        self.find_recipe(user_id, id).await
    }

    async fn delete_recipe(&self, user_id: Uuid, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(r#"DELETE FROM recipes WHERE id = $1 AND user_id = $2"#)
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
