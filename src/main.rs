use actix_web::{App, HttpResponse, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use storefront_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{AiGatewayService, ObjectStorageService},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    tasks,
    utils::JwtService,
};

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().map_err(|e| {
        log::error!("Failed to load configuration: {e}");
        std::io::Error::other(e.to_string())
    })?;

    // 创建数据库连接池
    let pool = Arc::new(create_pool(&config.database).await.map_err(|e| {
        log::error!("Failed to create database connection pool: {e}");
        std::io::Error::other(e.to_string())
    })?);

    // 运行数据库迁移
    run_migrations(&pool).await.map_err(|e| {
        log::error!("Failed to run database migrations: {e}");
        std::io::Error::other(e.to_string())
    })?;

    let jwt_service = JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expires_in,
        config.jwt.refresh_token_expires_in,
    );

    // 外部服务
    let storage = ObjectStorageService::new(config.storage.clone());
    let gateway = AiGatewayService::new(config.ai_gateway.clone());

    let auth_service = AuthService::new(pool.clone(), jwt_service.clone())
        .with_admin_emails(&config.admin.bootstrap_emails);
    let user_service = UserService::new(pool.clone());
    let wallet_service =
        WalletService::new(pool.clone(), storage.clone(), config.contact.clone());
    let catalog_service = CatalogService::new(pool.clone());
    let mfa_service = MfaService::new(pool.clone(), jwt_service.clone(), config.mfa.clone());
    let admin_service = AdminService::new(pool.clone(), storage);
    let chat_service = ChatService::new(gateway);

    // 配置里的管理员邮箱：已注册的立即授予 admin 角色
    auth_service.bootstrap_admins().await.map_err(|e| {
        log::error!("Failed to bootstrap admin roles: {e}");
        std::io::Error::other(e.to_string())
    })?;

    tasks::spawn_all(catalog_service.clone(), mfa_service.clone());

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let allowed_origins = config.server.allowed_origins.clone();
    let contact = config.contact.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .wrap(create_cors(&allowed_origins))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(user_service.clone()))
            .app_data(web::Data::new(wallet_service.clone()))
            .app_data(web::Data::new(catalog_service.clone()))
            .app_data(web::Data::new(mfa_service.clone()))
            .app_data(web::Data::new(admin_service.clone()))
            .app_data(web::Data::new(chat_service.clone()))
            .app_data(web::Data::new(contact.clone()))
            .route("/health", web::get().to(health))
            .configure(swagger_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::auth_config)
                    .configure(handlers::user_config)
                    .configure(handlers::wallet_config)
                    .configure(handlers::catalog_config)
                    .configure(handlers::mfa_config)
                    .configure(handlers::admin_config)
                    .configure(handlers::chat_config)
                    .configure(handlers::contact_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
