use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{
    AppRole, Currency, EnrollmentStatus, FactorStatus, FactorType, PaymentMethod,
    SubscriptionStatus, TransactionStatus, TransactionType,
};
use crate::handlers;
use crate::models::*;
use crate::utils::AssuranceLevel;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::me,
        handlers::user::get_profile,
        handlers::user::update_profile,
        handlers::wallet::get_wallet,
        handlers::wallet::submit_deposit,
        handlers::wallet::list_transactions,
        handlers::wallet::payment_methods,
        handlers::catalog::list_plans,
        handlers::catalog::list_courses,
        handlers::catalog::purchase_plan,
        handlers::catalog::my_subscription,
        handlers::catalog::enroll_course,
        handlers::catalog::my_enrollments,
        handlers::mfa::enroll,
        handlers::mfa::challenge,
        handlers::mfa::verify,
        handlers::mfa::list_factors,
        handlers::mfa::unenroll,
        handlers::mfa::assurance_level,
        handlers::mfa::lockout_status,
        handlers::admin::list_deposits,
        handlers::admin::review_deposit,
        handlers::admin::stats,
        handlers::admin::list_enrollments,
        handlers::admin::update_enrollment,
        handlers::chat::stream_chat,
        handlers::chat::generate_image,
        handlers::contact::order_link,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            RefreshTokenRequest,
            UpdateProfileRequest,
            UserResponse,
            AuthResponse,
            AssuranceLevel,
            AppRole,
            DepositProof,
            SubmitDepositRequest,
            TransactionResponse,
            WalletResponse,
            DepositSubmittedResponse,
            PaymentMethodInfo,
            TransactionType,
            TransactionStatus,
            Currency,
            PaymentMethod,
            PlanResponse,
            CourseResponse,
            SubscriptionResponse,
            SubscriptionStatus,
            PurchasePlanRequest,
            PurchasePlanResponse,
            EnrollmentResponse,
            EnrollmentStatus,
            EnrollRequest,
            TotpEnrollment,
            EnrollResponse,
            ChallengeRequest,
            ChallengeResponse,
            VerifyRequest,
            VerifyResponse,
            FactorResponse,
            FactorListResponse,
            FactorType,
            FactorStatus,
            AalResponse,
            LockoutStatusResponse,
            AdminDepositResponse,
            ReviewDepositRequest,
            ReviewDepositResponse,
            AdminStatsResponse,
            UpdateEnrollmentRequest,
            ChatRole,
            ChatMessage,
            ChatRequest,
            ImageRequest,
            ImageResponse,
            ChatErrorResponse,
            OrderLinkResponse,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication API"),
        (name = "user", description = "User profile API"),
        (name = "wallet", description = "Wallet and manual deposit API"),
        (name = "catalog", description = "Premium plans and courses API"),
        (name = "mfa", description = "TOTP multi-factor authentication API"),
        (name = "admin", description = "Back-office API (admin + aal2)"),
        (name = "chat", description = "AI assistant API"),
        (name = "contact", description = "WhatsApp ordering API"),
    ),
    info(
        title = "Storefront Backend API",
        version = "1.0.0",
        description = "Storefront Backend REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
