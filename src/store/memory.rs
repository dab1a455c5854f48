use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::recipe::repo_types::{
    CatalogFilter, CatalogItem, CatalogKind, NewRecipe, Recipe, RecipeChanges, RecipeFilter,
};
use crate::user::repo_types::{AuthToken, NewUser, User, UserChanges};

#[derive(Default)]
struct Tables {
    users: BTreeMap<Uuid, User>,
    tokens: BTreeMap<Uuid, AuthToken>,
    tags: BTreeMap<i64, CatalogItem>,
    ingredients: BTreeMap<i64, CatalogItem>,
    recipes: BTreeMap<i64, Recipe>,
    last_catalog_id: i64,
    last_recipe_id: i64,
}

impl Tables {
    fn catalog(&self, kind: CatalogKind) -> &BTreeMap<i64, CatalogItem> {
        match kind {
            CatalogKind::Tag => &self.tags,
            CatalogKind::Ingredient => &self.ingredients,
        }
    }

    fn catalog_mut(&mut self, kind: CatalogKind) -> &mut BTreeMap<i64, CatalogItem> {
        match kind {
            CatalogKind::Tag => &mut self.tags,
            CatalogKind::Ingredient => &mut self.ingredients,
        }
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

fn linked_ids(recipe: &Recipe, kind: CatalogKind) -> &[i64] {
    match kind {
        CatalogKind::Tag => &recipe.tags,
        CatalogKind::Ingredient => &recipe.ingredients,
    }
}

fn sorted_unique(ids: Vec<i64>) -> Vec<i64> {
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

fn links_any(linked: &[i64], wanted: Option<&Vec<i64>>) -> bool {
    wanted.map_or(true, |wanted| wanted.iter().any(|id| linked.contains(id)))
}

/// In-process store with the same contract as the PostgreSQL one.
/// Ids for tags and ingredients share one sequence.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.email_taken(&user.email, None) {
            return Err(StoreError::Conflict("users_email_key".into()));
        }
        let row = User {
            id: user.id,
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            is_active: user.is_active,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.write().await;
        if let Some(email) = &changes.email {
            if t.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict("users_email_key".into()));
            }
        }
        let Some(user) = t.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        Ok(Some(user.clone()))
    }

    async fn get_or_create_token(
        &self,
        user_id: Uuid,
        candidate_key: &str,
    ) -> Result<AuthToken, StoreError> {
        let mut t = self.tables.write().await;
        let token = t.tokens.entry(user_id).or_insert_with(|| AuthToken {
            key: candidate_key.to_string(),
            user_id,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(token.clone())
    }

    async fn find_token(&self, key: &str) -> Result<Option<AuthToken>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.tokens.values().find(|tok| tok.key == key).cloned())
    }

    async fn list_catalog(
        &self,
        kind: CatalogKind,
        filter: CatalogFilter,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let t = self.tables.read().await;
        let assigned: BTreeSet<i64> = t
            .recipes
            .values()
            .filter(|r| r.user_id == filter.user_id)
            .flat_map(|r| linked_ids(r, kind).iter().copied())
            .collect();

        let mut rows: Vec<CatalogItem> = t
            .catalog(kind)
            .values()
            .filter(|c| c.user_id == filter.user_id)
            .filter(|c| !filter.assigned_only || assigned.contains(&c.id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.name.cmp(&a.name).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn insert_catalog_item(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
        name: &str,
    ) -> Result<CatalogItem, StoreError> {
        let mut t = self.tables.write().await;
        t.last_catalog_id += 1;
        let item = CatalogItem {
            id: t.last_catalog_id,
            user_id,
            name: name.to_string(),
        };
        t.catalog_mut(kind).insert(item.id, item.clone());
        Ok(item)
    }

    async fn catalog_items_by_ids(
        &self,
        kind: CatalogKind,
        ids: &[i64],
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let t = self.tables.read().await;
        let catalog = t.catalog(kind);
        Ok(sorted_unique(ids.to_vec())
            .into_iter()
            .filter_map(|id| catalog.get(&id).cloned())
            .collect())
    }

    async fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.recipes
            .values()
            .rev()
            .filter(|r| r.user_id == filter.user_id)
            .filter(|r| links_any(&r.tags, filter.tags.as_ref()))
            .filter(|r| links_any(&r.ingredients, filter.ingredients.as_ref()))
            .cloned()
            .collect())
    }

    async fn find_recipe(&self, user_id: Uuid, id: i64) -> Result<Option<Recipe>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.recipes.get(&id).filter(|r| r.user_id == user_id).cloned())
    }

    async fn insert_recipe(&self, user_id: Uuid, recipe: NewRecipe) -> Result<Recipe, StoreError> {
        let mut t = self.tables.write().await;
        t.last_recipe_id += 1;
        let row = Recipe {
            id: t.last_recipe_id,
            user_id,
            title: recipe.title,
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            link: recipe.link,
            tags: sorted_unique(recipe.tags),
            ingredients: sorted_unique(recipe.ingredients),
        };
        t.recipes.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_recipe(
        &self,
        user_id: Uuid,
        id: i64,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(recipe) = t.recipes.get_mut(&id).filter(|r| r.user_id == user_id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            recipe.title = title;
        }
        if let Some(time_minutes) = changes.time_minutes {
            recipe.time_minutes = time_minutes;
        }
        if let Some(price) = changes.price {
            recipe.price = price;
        }
        if let Some(link) = changes.link {
            recipe.link = link;
        }
        if let Some(tags) = changes.tags {
            recipe.tags = sorted_unique(tags);
        }
        if let Some(ingredients) = changes.ingredients {
            recipe.ingredients = sorted_unique(ingredients);
        }
        Ok(Some(recipe.clone()))
    }

    async fn delete_recipe(&self, user_id: Uuid, id: i64) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let owned = t.recipes.get(&id).is_some_and(|r| r.user_id == user_id);
        if owned {
            t.recipes.remove(&id);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: "hash".into(),
            name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
        }
    }

    fn new_recipe(title: &str, tags: Vec<i64>, ingredients: Vec<i64>) -> NewRecipe {
        NewRecipe {
            title: title.into(),
            time_minutes: 10,
            price: Decimal::new(500, 2),
            link: String::new(),
            tags,
            ingredients,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_user(new_user("a@example.com")).await.unwrap();
        let err = store.insert_user(new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn token_is_created_once_per_user() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("a@example.com")).await.unwrap();
        let first = store.get_or_create_token(user.id, "first").await.unwrap();
        let second = store.get_or_create_token(user.id, "second").await.unwrap();
        assert_eq!(first.key, "first");
        assert_eq!(second.key, "first");
    }

    #[tokio::test]
    async fn assigned_only_deduplicates_shared_items() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let egg = store
            .insert_catalog_item(CatalogKind::Ingredient, owner, "Egg")
            .await
            .unwrap();
        store
            .insert_catalog_item(CatalogKind::Ingredient, owner, "Cheese")
            .await
            .unwrap();
        store
            .insert_recipe(owner, new_recipe("Eggs benedict", vec![], vec![egg.id]))
            .await
            .unwrap();
        store
            .insert_recipe(owner, new_recipe("Omelette", vec![], vec![egg.id, egg.id]))
            .await
            .unwrap();

        let filter = CatalogFilter { user_id: owner, assigned_only: true };
        let rows = store.list_catalog(CatalogKind::Ingredient, filter).await.unwrap();
        assert_eq!(rows, vec![egg]);
    }

    #[tokio::test]
    async fn recipes_are_scoped_and_newest_first() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let first = store.insert_recipe(owner, new_recipe("One", vec![], vec![])).await.unwrap();
        store.insert_recipe(other, new_recipe("Theirs", vec![], vec![])).await.unwrap();
        let second = store.insert_recipe(owner, new_recipe("Two", vec![], vec![])).await.unwrap();

        let filter = RecipeFilter { user_id: owner, ..Default::default() };
        let ids: Vec<i64> = store
            .list_recipes(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(store.find_recipe(other, first.id).await.unwrap().is_none());
        assert!(!store.delete_recipe(other, first.id).await.unwrap());
    }
}
