use anyhow::Context;
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use tracing::{error, info, warn};

use super::{
    claims::Claims,
    dto::{
        AdminResponse, AuthResponse, LoginRequest, LoginUser, MessageResponse, PublicUser,
        RegisterRequest, UpdateMeRequest, UpdatedUser,
    },
    password::Hasher,
    repo::{StoreError, User, UserProfile, UserUpdate},
};
use crate::{error::AppError, state::AppState};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Empty strings are treated the same as missing fields.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn credentials(email: Option<String>, password: Option<String>) -> Result<(String, String), AppError> {
    match (present(email), present(password)) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => Err(AppError::invalid_input("email and password are required")),
    }
}

async fn hash_password(hasher: &Hasher, plain: String) -> Result<String, AppError> {
    let hasher = hasher.clone();
    let hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
        .await
        .context("password hashing task failed")??;
    Ok(hash)
}

async fn verify_password(hasher: &Hasher, plain: String, hash: String) -> Result<bool, AppError> {
    let hasher = hasher.clone();
    let ok = tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
        .await
        .context("password verification task failed")?;
    Ok(ok)
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<PublicUser, AppError> {
    let (email, password) = credentials(req.email, req.password)?;
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::invalid_input("invalid email"));
    }

    let hash = hash_password(&state.hasher, password).await?;
    let user = User::insert(&state.db, &email, &hash, false)
        .await
        .map_err(|e| {
            warn!(email = %email, error = %e, "register failed");
            AppError::from(e)
        })?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(PublicUser {
        id: user.id,
        email: user.email,
    })
}

/// Unknown email and wrong password produce the same error.
pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AppError> {
    let (email, password) = credentials(req.email, req.password)?;

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        // same argon2 work as a wrong password
        let decoy = state.hasher.decoy_hash().to_string();
        verify_password(&state.hasher, password, decoy).await?;
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(&state.hasher, password, user.password_hash.clone()).await? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.keys.sign(user.id, user.is_admin)?;
    info!(user_id = user.id, "user logged in");
    Ok(AuthResponse {
        token,
        user: LoginUser {
            id: user.id,
            email: user.email,
            is_admin: user.is_admin,
        },
    })
}

pub async fn get_self(state: &AppState, claims: &Claims) -> Result<UserProfile, AppError> {
    User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or(AppError::NotFound)
}

pub fn public_info() -> MessageResponse {
    MessageResponse {
        message: "public route, no authentication required",
    }
}

pub fn admin_info(claims: &Claims) -> AdminResponse {
    AdminResponse {
        message: "admin area accessed",
        user_id: claims.sub,
    }
}

pub async fn list_users(state: &AppState) -> Result<Vec<UserProfile>, AppError> {
    Ok(User::list_all(&state.db).await?)
}

/// Updates the caller's own row. The target is always `claims.sub`.
pub async fn update_self(
    state: &AppState,
    claims: &Claims,
    req: UpdateMeRequest,
) -> Result<UpdatedUser, AppError> {
    let email = present(req.email);
    let password = present(req.password);
    if email.is_none() && password.is_none() {
        return Err(AppError::invalid_input("provide email and/or password to update"));
    }
    if let Some(email) = &email {
        if !is_valid_email(email) {
            return Err(AppError::invalid_input("invalid email"));
        }
    }

    let password_hash = match password {
        Some(plain) => Some(hash_password(&state.hasher, plain).await?),
        None => None,
    };
    let changes = UserUpdate {
        email,
        password_hash,
    };

    let updated = User::update(&state.db, claims.sub, &changes)
        .await
        .map_err(|e| {
            warn!(user_id = claims.sub, error = %e, "self update failed");
            AppError::from(e)
        })?;

    info!(
        user_id = updated.id,
        email_changed = changes.email.is_some(),
        password_changed = changes.password_hash.is_some(),
        "user updated"
    );
    Ok(UpdatedUser {
        id: updated.id,
        email: updated.email,
        message: "updated successfully",
    })
}

/// Seeds the configured admin account when no admin exists yet.
pub async fn ensure_admin(state: &AppState) -> anyhow::Result<()> {
    if User::admin_exists(&state.db).await? {
        return Ok(());
    }

    let seed = &state.config.admin;
    let password = match &seed.password {
        Some(p) => p.clone(),
        None => {
            let generated: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(20)
                .map(char::from)
                .collect();
            warn!(
                email = %seed.email,
                password = %generated,
                "ADMIN_PASSWORD not set; generated a password for the initial admin"
            );
            generated
        }
    };

    let hash = hash_password(&state.hasher, password)
        .await
        .map_err(|e| anyhow::anyhow!("hash admin password: {e}"))?;
    match User::insert(&state.db, &seed.email, &hash, true).await {
        Ok(_) => {
            info!(email = %seed.email, "initial admin created");
            Ok(())
        }
        Err(StoreError::DuplicateEmail) => {
            error!(
                email = %seed.email,
                "could not create initial admin: email already belongs to a regular account"
            );
            Ok(())
        }
        Err(e) => Err::<(), _>(e).with_context(|| format!("create initial admin {}", seed.email)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no spaces@x.com"));
        assert!(!is_valid_email("plain"));
    }

    #[tokio::test]
    async fn register_then_login_yields_token_for_that_user() {
        let state = AppState::fake().await;
        let user = register(&state, register_req("a@x.com", "pw1")).await.unwrap();
        assert_eq!(user, PublicUser { id: 1, email: "a@x.com".into() });

        let resp = login(&state, login_req("a@x.com", "pw1")).await.unwrap();
        let claims = state.keys.verify(&resp.token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert!(!claims.is_admin);
        assert!(!resp.user.is_admin);
    }

    #[tokio::test]
    async fn register_twice_with_same_email_conflicts() {
        let state = AppState::fake().await;
        register(&state, register_req("a@x.com", "pw1")).await.unwrap();
        let err = register(&state, register_req("a@x.com", "other")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
    }

    #[tokio::test]
    async fn register_requires_both_fields() {
        let state = AppState::fake().await;
        let err = register(&state, RegisterRequest { email: Some("a@x.com".into()), password: None })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = register(&state, register_req("", "pw")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = register(&state, register_req("not-an-email", "pw")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn stored_hashes_differ_for_same_password() {
        let state = AppState::fake().await;
        register(&state, register_req("a@x.com", "same")).await.unwrap();
        register(&state, register_req("b@x.com", "same")).await.unwrap();
        let a = User::find_by_email(&state.db, "a@x.com").await.unwrap().unwrap();
        let b = User::find_by_email(&state.db, "b@x.com").await.unwrap().unwrap();
        assert_ne!(a.password_hash, b.password_hash);
        assert_ne!(a.password_hash, "same");
    }

    #[tokio::test]
    async fn login_failures_share_one_error() {
        let state = AppState::fake().await;
        register(&state, register_req("a@x.com", "pw1")).await.unwrap();

        let wrong = login(&state, login_req("a@x.com", "nope")).await.unwrap_err();
        let unknown = login(&state, login_req("ghost@x.com", "pw1")).await.unwrap_err();
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());

        let missing = login(&state, LoginRequest::default()).await.unwrap_err();
        assert!(matches!(missing, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn update_self_only_touches_callers_row() {
        let state = AppState::fake().await;
        let a = register(&state, register_req("a@x.com", "pw-a")).await.unwrap();
        let b = register(&state, register_req("b@x.com", "pw-b")).await.unwrap();
        let claims_a = state.keys.verify(&state.keys.sign(a.id, false).unwrap()).unwrap();

        let updated = update_self(
            &state,
            &claims_a,
            UpdateMeRequest { email: Some("new@x.com".into()), password: None },
        )
        .await
        .unwrap();
        assert_eq!(updated.id, a.id);
        assert_eq!(updated.email, "new@x.com");

        assert_eq!(get_self(&state, &claims_a).await.unwrap().email, "new@x.com");
        let other = User::find_by_id(&state.db, b.id).await.unwrap().unwrap();
        assert_eq!(other.email, "b@x.com");
        assert!(login(&state, login_req("b@x.com", "pw-b")).await.is_ok());
    }

    #[tokio::test]
    async fn update_self_changes_password() {
        let state = AppState::fake().await;
        let a = register(&state, register_req("a@x.com", "pw1")).await.unwrap();
        let claims = state.keys.verify(&state.keys.sign(a.id, false).unwrap()).unwrap();

        update_self(&state, &claims, UpdateMeRequest { email: None, password: Some("pw2".into()) })
            .await
            .unwrap();
        assert!(matches!(
            login(&state, login_req("a@x.com", "pw1")).await.unwrap_err(),
            AppError::InvalidCredentials
        ));
        assert!(login(&state, login_req("a@x.com", "pw2")).await.is_ok());
    }

    #[tokio::test]
    async fn update_self_validates_and_reports_conflicts() {
        let state = AppState::fake().await;
        let a = register(&state, register_req("a@x.com", "pw")).await.unwrap();
        register(&state, register_req("b@x.com", "pw")).await.unwrap();
        let claims = state.keys.verify(&state.keys.sign(a.id, false).unwrap()).unwrap();

        let empty = UpdateMeRequest { email: Some(String::new()), password: None };
        assert!(matches!(
            update_self(&state, &claims, empty).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));

        let taken = UpdateMeRequest { email: Some("b@x.com".into()), password: None };
        assert!(matches!(
            update_self(&state, &claims, taken).await.unwrap_err(),
            AppError::DuplicateEmail
        ));
    }

    #[tokio::test]
    async fn update_self_for_vanished_user_is_not_found() {
        let state = AppState::fake().await;
        let ghost = state.keys.verify(&state.keys.sign(404, false).unwrap()).unwrap();
        let req = UpdateMeRequest { email: None, password: Some("pw".into()) };
        assert!(matches!(
            update_self(&state, &ghost, req).await.unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(get_self(&state, &ghost).await.unwrap_err(), AppError::NotFound));
    }

    #[tokio::test]
    async fn ensure_admin_seeds_once() {
        let state = AppState::fake().await;
        ensure_admin(&state).await.unwrap();
        ensure_admin(&state).await.unwrap();

        let users = list_users(&state).await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_admin);
        assert_eq!(users[0].email, "admin@local");

        let resp = login(&state, login_req("admin@local", "adminpass")).await.unwrap();
        assert!(state.keys.verify(&resp.token).unwrap().is_admin);
    }

    #[tokio::test]
    async fn ensure_admin_keeps_running_when_email_is_taken() {
        let state = AppState::fake().await;
        let hash = state.hasher.hash("userpass").unwrap();
        User::insert(&state.db, "admin@local", &hash, false).await.unwrap();

        ensure_admin(&state).await.unwrap();

        assert!(!User::admin_exists(&state.db).await.unwrap());
        let users = list_users(&state).await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(!users[0].is_admin);
        login(&state, login_req("admin@local", "userpass")).await.unwrap();
        let err = login(&state, login_req("admin@local", "adminpass")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_email_login_runs_against_decoy() {
        let state = AppState::fake().await;
        let err = login(&state, login_req("ghost@x.com", "pw1")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

        #[test]
    fn admin_info_reports_caller() {
        let claims = Claims {
            sub: 9,
            is_admin: true,
            iat: 0,
            exp: 0,
            iss: String::new(),
            aud: String::new(),
        };
        assert_eq!(admin_info(&claims).user_id, 9);
    }
}
