pub mod admin_security;
pub mod admin_wallet;
pub mod course_enrollments;
pub mod courses;
pub mod mfa_challenges;
pub mod mfa_factors;
pub mod premium_plans;
pub mod profiles;
pub mod transactions;
pub mod user_roles;
pub mod user_subscriptions;
pub mod user_wallets;
pub mod users;

pub use admin_security as admin_security_entity;
pub use admin_wallet as admin_wallet_entity;
pub use course_enrollments as course_enrollment_entity;
pub use courses as course_entity;
pub use mfa_challenges as mfa_challenge_entity;
pub use mfa_factors as mfa_factor_entity;
pub use premium_plans as premium_plan_entity;
pub use profiles as profile_entity;
pub use transactions as transaction_entity;
pub use user_roles as user_role_entity;
pub use user_subscriptions as user_subscription_entity;
pub use user_wallets as user_wallet_entity;
pub use users as user_entity;

pub use course_enrollments::EnrollmentStatus;
pub use mfa_factors::{FactorStatus, FactorType};
pub use transactions::{Currency, PaymentMethod, TransactionStatus, TransactionType};
pub use user_roles::AppRole;
pub use user_subscriptions::SubscriptionStatus;
