use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{too_long, AppError, FieldErrors, BLANK, MAX_NAME_LEN, REQUIRED},
    store::{Store, StoreError},
    user::{
        password::{check_password_policy, hash_password},
        repo_types::{AuthToken, NewUser, User, UserChanges},
    },
};

pub const TOKEN_KEY_LEN: usize = 40;
const DUPLICATE_EMAIL: &str = "user with this email already exists.";
const INVALID_EMAIL: &str = "Enter a valid email address.";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trims the address and lowercases the domain part; the local part keeps its case.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

fn duplicate_email(e: StoreError) -> AppError {
    match e {
        StoreError::Conflict(_) => AppError::field("email", DUPLICATE_EMAIL),
        other => other.into(),
    }
}

/// Fields of a new account beyond its credentials.
#[derive(Debug, Clone, Default)]
pub struct ExtraFields {
    pub name: Option<String>,
    /// Defaults to active.
    pub is_active: Option<bool>,
    pub is_staff: bool,
    pub is_superuser: bool,
}

pub async fn create_user(
    store: &dyn Store,
    email: Option<&str>,
    password: &str,
    extra: ExtraFields,
) -> Result<User, AppError> {
    let email = email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::field("email", "Users must have an email address."))?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: normalize_email(email),
        password_hash: hash_password(password)?,
        name: extra.name.unwrap_or_default(),
        is_active: extra.is_active.unwrap_or(true),
        is_staff: extra.is_staff,
        is_superuser: extra.is_superuser,
    };

    let user = store.insert_user(new_user).await.map_err(duplicate_email)?;
    info!(user_id = %user.id, email = %user.email, "user created");
    Ok(user)
}

pub async fn create_superuser(
    store: &dyn Store,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    let extra = ExtraFields {
        is_staff: true,
        is_superuser: true,
        ..Default::default()
    };
    create_user(store, Some(email), password, extra).await
}

/// Creates the configured administrator unless an account with that email
/// already exists. Returns the new account, if any.
#[instrument(skip(store, password))]
pub async fn bootstrap_superuser(
    store: &dyn Store,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    if store.find_user_by_email(&normalize_email(email)).await?.is_some() {
        debug!("administrator account already present");
        return Ok(None);
    }
    let user = create_superuser(store, email, password).await?;
    info!(user_id = %user.id, "administrator account created");
    Ok(Some(user))
}

/// Signup: full payload validation, then [`create_user`].
#[instrument(skip(store, password))]
pub async fn register(
    store: &dyn Store,
    email: Option<String>,
    password: Option<String>,
    name: Option<String>,
) -> Result<User, AppError> {
    let mut errors = FieldErrors::new();

    match email.as_deref().map(str::trim) {
        None => errors.add("email", REQUIRED),
        Some("") => errors.add("email", BLANK),
        Some(e) if e.chars().count() > MAX_NAME_LEN => errors.add("email", too_long(MAX_NAME_LEN)),
        Some(e) if !is_valid_email(e) => errors.add("email", INVALID_EMAIL),
        Some(_) => {}
    }
    match password.as_deref() {
        None => errors.add("password", REQUIRED),
        Some("") => errors.add("password", BLANK),
        Some(p) => {
            if let Some(msg) = check_password_policy(p) {
                errors.add("password", msg);
            }
        }
    }
    if let Some(n) = &name {
        if n.chars().count() > MAX_NAME_LEN {
            errors.add("name", too_long(MAX_NAME_LEN));
        }
    }
    if let Err(e) = errors.into_result() {
        warn!(error = %e, "signup rejected");
        return Err(e);
    }

    let extra = ExtraFields {
        name: name.map(|n| n.trim().to_string()),
        ..Default::default()
    };
    create_user(store, email.as_deref(), password.as_deref().unwrap_or_default(), extra).await
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

#[instrument(skip(store, changes))]
pub async fn update_profile(
    store: &dyn Store,
    user_id: Uuid,
    changes: ProfileChanges,
) -> Result<User, AppError> {
    let mut errors = FieldErrors::new();
    let mut update = UserChanges::default();

    if let Some(email) = changes.email {
        let email = email.trim();
        if email.is_empty() {
            errors.add("email", BLANK);
        } else if email.chars().count() > MAX_NAME_LEN {
            errors.add("email", too_long(MAX_NAME_LEN));
        } else if !is_valid_email(email) {
            errors.add("email", INVALID_EMAIL);
        } else {
            update.email = Some(normalize_email(email));
        }
    }
    if let Some(name) = changes.name {
        if name.chars().count() > MAX_NAME_LEN {
            errors.add("name", too_long(MAX_NAME_LEN));
        } else {
            update.name = Some(name.trim().to_string());
        }
    }
    if let Some(msg) = changes.password.as_deref().and_then(check_password_policy) {
        errors.add("password", msg);
    }
    errors.into_result()?;

    if let Some(password) = changes.password {
        update.password_hash = Some(hash_password(&password)?);
    }

    let user = store
        .update_user(user_id, update)
        .await
        .map_err(duplicate_email)?
        .ok_or(AppError::NotFound)?;
    info!(user_id = %user.id, "profile updated");
    Ok(user)
}

pub async fn get_profile(store: &dyn Store, user_id: Uuid) -> Result<User, AppError> {
    store
        .find_user_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound)
}

fn generate_token_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Exchanges credentials for the user's token. Every failure is reported the
/// same way so callers cannot tell which check failed.
#[instrument(skip(store, password))]
pub async fn issue_token(
    store: &dyn Store,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<AuthToken, AppError> {
    let email = email.map(str::trim).filter(|e| !e.is_empty());
    let password = password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        warn!("token request missing credentials");
        return Err(AppError::InvalidCredentials);
    };

    let email = normalize_email(email);
    let Some(user) = store.find_user_by_email(&email).await? else {
        warn!(%email, "token request for unknown email");
        return Err(AppError::InvalidCredentials);
    };
    if !user.is_active {
        warn!(user_id = %user.id, "token request for inactive user");
        return Err(AppError::InvalidCredentials);
    }
    if !user.check_password(password) {
        warn!(user_id = %user.id, "token request with invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = store
        .get_or_create_token(user.id, &generate_token_key())
        .await?;
    info!(user_id = %user.id, "token issued");
    Ok(token)
}

/// Resolves a presented token key to its active user.
pub async fn authenticate(store: &dyn Store, key: &str) -> Result<Uuid, AppError> {
    let Some(token) = store.find_token(key).await? else {
        debug!("unknown token presented");
        return Err(AppError::Unauthorized("Invalid token."));
    };
    match store.find_user_by_id(token.user_id).await? {
        Some(user) if user.is_active => Ok(user.id),
        _ => Err(AppError::Unauthorized("User inactive or deleted.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn normalize_lowercases_domain_only() {
        assert_eq!(normalize_email("aljon@YAHOO.com"), "aljon@yahoo.com");
        assert_eq!(normalize_email("  Aljon@Yahoo.COM "), "Aljon@yahoo.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("aljon@yahoo.com"));
        assert!(!is_valid_email("aljon"));
        assert!(!is_valid_email("aljon@yahoo"));
        assert!(!is_valid_email("al jon@yahoo.com"));
    }

    #[tokio::test]
    async fn create_user_with_email_successful() {
        let store = MemoryStore::new();
        let user = create_user(&store, Some("aljon@yahoo.com"), "testing1234", ExtraFields::default())
            .await
            .unwrap();
        assert_eq!(user.email, "aljon@yahoo.com");
        assert!(user.check_password("testing1234"));
        assert!(user.is_active);
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
        assert_ne!(user.password_hash, "testing1234");
    }

    #[tokio::test]
    async fn new_user_email_normalized() {
        let store = MemoryStore::new();
        let user = create_user(&store, Some("aljon@YAHOO.com"), "testing1234", ExtraFields::default())
            .await
            .unwrap();
        assert_eq!(user.email, "aljon@yahoo.com");
    }

    #[tokio::test]
    async fn new_user_without_email_fails() {
        let store = MemoryStore::new();
        for email in [None, Some(""), Some("   ")] {
            let err = create_user(&store, email, "testing1234", ExtraFields::default())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(ref f) if f.get("email").is_some()));
        }
    }

    #[tokio::test]
    async fn duplicate_normalized_email_fails() {
        let store = MemoryStore::new();
        create_user(&store, Some("aljon@yahoo.com"), "pw", ExtraFields::default())
            .await
            .unwrap();
        let err = create_user(&store, Some("aljon@YAHOO.COM"), "pw", ExtraFields::default())
            .await
            .unwrap_err();
        match err {
            AppError::Validation(f) => assert_eq!(f.get("email").unwrap()[0], DUPLICATE_EMAIL),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_superuser_sets_flags() {
        let store = MemoryStore::new();
        let user = create_superuser(&store, "aljon@yahoo.com", "testing1234").await.unwrap();
        assert!(user.is_staff);
        assert!(user.is_superuser);
    }

    #[tokio::test]
    async fn bootstrap_superuser_runs_once() {
        let store = MemoryStore::new();
        let created = bootstrap_superuser(&store, "admin@EXAMPLE.com", "testing1234")
            .await
            .unwrap()
            .expect("first run creates the account");
        assert!(created.is_superuser && created.is_staff);
        assert_eq!(created.email, "admin@example.com");

        let again = bootstrap_superuser(&store, "admin@example.com", "other-password")
            .await
            .unwrap();
        assert!(again.is_none());
        let stored = store.find_user_by_email("admin@example.com").await.unwrap().unwrap();
        assert!(stored.check_password("testing1234"));
    }

    #[tokio::test]
    async fn overlong_email_is_a_field_error() {
        let store = MemoryStore::new();
        let email = format!("{}@example.com", "a".repeat(300));
        let err = register(&store, Some(email.clone()), Some("testing1234".into()), None)
            .await
            .unwrap_err();
        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields.get("email").unwrap()[0], too_long(MAX_NAME_LEN));
        assert!(store.find_user_by_email(&email).await.unwrap().is_none());

        let user = create_user(&store, Some("aljon@yahoo.com"), "testing1234", ExtraFields::default())
            .await
            .unwrap();
        let changes = ProfileChanges {
            email: Some(email),
            ..Default::default()
        };
        let err = update_profile(&store, user.id, changes).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref f) if f.get("email").is_some()));
        let unchanged = get_profile(&store, user.id).await.unwrap();
        assert_eq!(unchanged.email, "aljon@yahoo.com");
    }

    #[tokio::test]
    async fn email_at_column_limit_is_accepted() {
        let store = MemoryStore::new();
        let email = format!("{}@example.com", "a".repeat(MAX_NAME_LEN - "@example.com".len()));
        assert_eq!(email.chars().count(), MAX_NAME_LEN);
        let user = register(&store, Some(email.clone()), Some("testing1234".into()), None)
            .await
            .unwrap();
        assert_eq!(user.email, email);
    }

    #[tokio::test]
    async fn register_rejects_short_password_without_creating() {
        let store = MemoryStore::new();
        let err = register(
            &store,
            Some("aljon1234@yahoo.com".into()),
            Some("pw".into()),
            Some("Test".into()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref f) if f.get("password").is_some()));
        assert!(store.find_user_by_email("aljon1234@yahoo.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn register_collects_every_field_error() {
        let store = MemoryStore::new();
        let err = register(&store, Some("not-an-email".into()), None, None)
            .await
            .unwrap_err();
        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields.get("email").unwrap()[0], INVALID_EMAIL);
        assert_eq!(fields.get("password").unwrap()[0], REQUIRED);
    }

    #[tokio::test]
    async fn token_is_reused_across_logins() {
        let store = MemoryStore::new();
        create_user(&store, Some("aljon@yahoo.com"), "testing1234", ExtraFields::default())
            .await
            .unwrap();
        let first = issue_token(&store, Some("aljon@yahoo.com"), Some("testing1234"))
            .await
            .unwrap();
        let second = issue_token(&store, Some("aljon@YAHOO.com"), Some("testing1234"))
            .await
            .unwrap();
        assert_eq!(first.key.len(), TOKEN_KEY_LEN);
        assert_eq!(first.key, second.key);
        assert_eq!(authenticate(&store, &first.key).await.unwrap(), first.user_id);
    }

    #[tokio::test]
    async fn token_failures_are_indistinguishable() {
        let store = MemoryStore::new();
        create_user(&store, Some("aljon@yahoo.com"), "testing1234", ExtraFields::default())
            .await
            .unwrap();
        let dormant = ExtraFields {
            is_active: Some(false),
            ..Default::default()
        };
        create_user(&store, Some("dormant@yahoo.com"), "testing1234", dormant)
            .await
            .unwrap();
        let attempts = [
            (Some("aljon@yahoo.com"), Some("wrong")),
            (Some("dormant@yahoo.com"), Some("testing1234")),
            (Some("nobody@yahoo.com"), Some("testing1234")),
            (Some("aljon@yahoo.com"), None),
            (None, Some("testing1234")),
        ];
        for (email, password) in attempts {
            let err = issue_token(&store, email, password).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn create_user_honours_is_active() {
        let store = MemoryStore::new();
        let extra = ExtraFields {
            is_active: Some(false),
            ..Default::default()
        };
        let user = create_user(&store, Some("dormant@yahoo.com"), "testing1234", extra)
            .await
            .unwrap();
        assert!(!user.is_active);
    }

    #[tokio::test]
    async fn authenticate_rejects_inactive_user() {
        let store = MemoryStore::new();
        let extra = ExtraFields {
            is_active: Some(false),
            ..Default::default()
        };
        let user = create_user(&store, Some("dormant@yahoo.com"), "testing1234", extra)
            .await
            .unwrap();
        // a token left over from when the account was active
        let token = store.get_or_create_token(user.id, "k".repeat(TOKEN_KEY_LEN).as_str())
            .await
            .unwrap();
        let err = authenticate(&store, &token.key).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized("User inactive or deleted.")));
    }

    #[tokio::test]
    async fn authenticate_rejects_unknown_key() {
        let store = MemoryStore::new();
        let err = authenticate(&store, "nope").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn update_profile_rehashes_and_normalizes() {
        let store = MemoryStore::new();
        let user = create_user(&store, Some("aljon@yahoo.com"), "testing1234", ExtraFields::default())
            .await
            .unwrap();
        let changes = ProfileChanges {
            email: Some("new@EXAMPLE.com".into()),
            name: Some("New name".into()),
            password: Some("newpassword".into()),
        };
        let updated = update_profile(&store, user.id, changes).await.unwrap();
        assert_eq!(updated.email, "new@example.com");
        assert_eq!(updated.name, "New name");
        assert!(updated.check_password("newpassword"));
        assert!(!updated.check_password("testing1234"));
    }

    #[tokio::test]
    async fn update_profile_rejects_taken_email() {
        let store = MemoryStore::new();
        create_user(&store, Some("taken@yahoo.com"), "testing1234", ExtraFields::default())
            .await
            .unwrap();
        let user = create_user(&store, Some("aljon@yahoo.com"), "testing1234", ExtraFields::default())
            .await
            .unwrap();
        let changes = ProfileChanges {
            email: Some("taken@yahoo.com".into()),
            ..Default::default()
        };
        let err = update_profile(&store, user.id, changes).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref f) if f.get("email").is_some()));
    }
}
