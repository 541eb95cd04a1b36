use crate::dto::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest,
    RegisterRequest, ResendVerificationRequest, ResetPasswordRequest, SuccessEnvelope,
    TokenResponse, UpdateProfileRequest, UserResponse, VerifyEmailRequest,
};
use crate::error::{
    email_verification_error, forgot_password_error, login_error, password_reset_error,
    refresh_error, register_error, resend_verification_error, session_error, validation_error,
    ApiError,
};
use crate::extractor::AuthenticatedUser;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let outcome = state
        .auth
        .register(&req.email, &req.password, &req.given_name, &req.family_name, req.company, None, None)
        .await
        .map_err(register_error)?;

    Ok((StatusCode::CREATED, Json(auth_response(outcome))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let outcome = state.auth.login(&req.email, &req.password, req.remember_me, None, None).await.map_err(login_error)?;
    Ok(Json(auth_response(outcome)))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let tokens = state.auth.refresh(&req.refresh_token).await.map_err(refresh_error)?;
    Ok(Json(TokenResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    AuthenticatedUser(validated): AuthenticatedUser,
) -> Result<Json<SuccessEnvelope>, ApiError> {
    state.auth.logout(validated.session.id).await.map_err(session_error)?;
    Ok(Json(SuccessEnvelope::ok("logged out")))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<SuccessEnvelope>, ApiError> {
    state.auth.forgot_password(&req.email).await.map_err(forgot_password_error)?;
    Ok(Json(SuccessEnvelope::ok("if that address exists, password reset instructions have been sent")))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<SuccessEnvelope>, ApiError> {
    state.auth.reset_password(&req.token, &req.new_password).await.map_err(password_reset_error)?;
    Ok(Json(SuccessEnvelope::ok("password has been reset")))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<SuccessEnvelope>, ApiError> {
    state.auth.verify_email(&req.token).await.map_err(email_verification_error)?;
    Ok(Json(SuccessEnvelope::ok("email verified")))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<Json<SuccessEnvelope>, ApiError> {
    state.auth.resend_verification(&req.email).await.map_err(resend_verification_error)?;
    Ok(Json(SuccessEnvelope::ok("verification email sent")))
}

pub async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(validated): AuthenticatedUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.auth.get_user(validated.claims.sub).await.map_err(session_error)?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(validated): AuthenticatedUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .auth
        .update_profile(validated.claims.sub, req.given_name, req.family_name, req.company)
        .await
        .map_err(session_error)?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(validated): AuthenticatedUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<SuccessEnvelope>, ApiError> {
    state
        .auth
        .change_password(validated.claims.sub, &req.current_password, &req.new_password)
        .await
        .map_err(validation_error)?;
    Ok(Json(SuccessEnvelope::ok("password changed")))
}

fn auth_response(outcome: identity_auth::AuthOutcome) -> AuthResponse {
    AuthResponse {
        user: UserResponse::from(&outcome.user),
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
        expires_in: outcome.tokens.expires_in,
        remember_me: outcome.remember_me,
        session_id: outcome.tokens.session_id,
    }
}
