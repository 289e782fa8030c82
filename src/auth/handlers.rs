use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, PublicUser,
            RefreshRequest, RegisterRequest, ResetPasswordRequest, UpdateProfileRequest,
        },
        extractors::{cookie_value, AuthUser, ACCESS_COOKIE, REFRESH_COOKIE},
        jwt::{TokenIssuer, TokenPair},
        services::ProfileUpdate,
    },
    error::AppError,
    extract::Json,
    images::{delete_images, upload_images, FormData},
    response::{ok, ApiResponse},
    state::AppState,
    users::User,
};

type JsonResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/refresh-token", post(refresh))
        .route("/users/logout", post(logout))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/reset-password", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me).patch(update_me))
        .route(
            "/users/me/avatar",
            put(upload_avatar).layer(DefaultBodyLimit::max(5 * 1024 * 1024)),
        )
}

fn session_cookie(name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn with_session(jar: CookieJar, tokens: &TokenIssuer, pair: &TokenPair) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_COOKIE,
        pair.access_token.clone(),
        tokens.access_ttl(),
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        pair.refresh_token.clone(),
        tokens.refresh_ttl(),
    ))
}

fn cleared(name: &'static str) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new(), Duration::ZERO);
    cookie.make_removal();
    cookie
}

fn auth_response(user: User, pair: TokenPair) -> AuthResponse {
    AuthResponse {
        user: PublicUser::from(user),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PublicUser>>), AppError> {
    let user = state
        .auth
        .sign_up(&payload.username, &payload.email, &payload.password)
        .await?;
    info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, ok(PublicUser::from(user))))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<AuthResponse>>), AppError> {
    let (user, pair) = state
        .auth
        .sign_in(&payload.identifier, &payload.password)
        .await?;
    let jar = with_session(jar, state.auth.tokens(), &pair);
    Ok((jar, ok(auth_response(user, pair))))
}

/// Accepts `{"refresh_token": ..}` or, with an empty body, the refresh
/// cookie.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<ApiResponse<AuthResponse>>), AppError> {
    let token = if body.is_empty() {
        cookie_value(&jar, REFRESH_COOKIE).ok_or(AppError::InvalidToken)?
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| AppError::validation(format!("Invalid request body: {e}")))?
            .refresh_token
    };

    let (user, pair) = state.auth.refresh(&token).await?;
    let jar = with_session(jar, state.auth.tokens(), &pair);
    Ok((jar, ok(auth_response(user, pair))))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Json<ApiResponse<MessageResponse>>) {
    let jar = jar.add(cleared(ACCESS_COOKIE)).add(cleared(REFRESH_COOKIE));
    (
        jar,
        ok(MessageResponse {
            message: "Logged out successfully",
        }),
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MessageResponse>>), AppError> {
    state.auth.request_password_reset(&payload.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        ok(MessageResponse {
            message: "If the account exists, a reset link has been sent",
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> JsonResult<MessageResponse> {
    state
        .auth
        .reset_password(&payload.email, &payload.token, &payload.password)
        .await?;
    Ok(ok(MessageResponse {
        message: "Password has been reset",
    }))
}

#[instrument(skip(state, who))]
pub async fn get_me(State(state): State<AppState>, who: AuthUser) -> JsonResult<PublicUser> {
    let user = state.auth.users().get(who.id).await?;
    Ok(ok(PublicUser::from(user)))
}

#[instrument(skip(state, who, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    who: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> JsonResult<PublicUser> {
    let user = state
        .auth
        .update_profile(
            who.id,
            ProfileUpdate {
                username: payload.username,
                email: payload.email,
                password: payload.password,
            },
        )
        .await?;
    Ok(ok(PublicUser::from(user)))
}

#[instrument(skip(state, who, form))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    who: AuthUser,
    mut form: FormData,
) -> JsonResult<PublicUser> {
    let files = form.take_files("avatar");
    if files.len() != 1 {
        return Err(AppError::validation("Exactly one avatar image is required"));
    }

    let stored = upload_images(state.storage.as_ref(), "avatars", who.id, files).await?;
    let avatar = stored[0].clone();
    let (user, previous) = match state.auth.replace_avatar(who.id, avatar).await {
        Ok(v) => v,
        Err(e) => {
            delete_images(state.storage.as_ref(), &stored).await;
            return Err(e);
        }
    };

    if let Some(previous) = previous {
        delete_images(state.storage.as_ref(), std::slice::from_ref(&previous)).await;
    }
    info!(user_id = %user.id, avatar = %user.avatar_id, "avatar updated");
    Ok(ok(PublicUser::from(user)))
}
