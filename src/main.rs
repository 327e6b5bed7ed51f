use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use depot_chat::auth::TokenVerifier;
use depot_chat::cache::{CacheData, RedisCache};
use depot_chat::chat::ChatContext;
use depot_chat::chat::rate_limit::RateLimiter;
use depot_chat::config::Config;
use depot_chat::create_pool;
use depot_chat::handlers;
use dotenv::dotenv;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Config::from_env().map_err(std::io::Error::other)?;

    let db = create_pool(&config.database_url)
        .await
        .map_err(|e| std::io::Error::other(format!("Database setup failed: {e}")))?;
    tracing::info!("Database connected and migrated");

    // Redis only backs the user lookup cache; without it lookups hit the store.
    let cache: CacheData = match &config.redis_url {
        Some(url) => match RedisCache::new(url).await {
            Ok(c) => {
                tracing::info!("Connected to Redis");
                Some(Arc::new(c))
            }
            Err(e) => {
                tracing::warn!("Redis unavailable, lookup cache disabled: {e}");
                None
            }
        },
        None => None,
    };
    let cache_data = web::Data::new(cache);

    let verifier = web::Data::new(TokenVerifier::from_config(&config.auth));
    let db_data = web::Data::new(db.clone());

    // Registry lives for the whole process and is drained on shutdown.
    let chat = ChatContext::new(db, config.chat.clone());
    let registry = chat.registry.clone();
    let chat_data = web::Data::new(chat);

    let lookup_limiter = web::Data::new(RateLimiter::new(
        config.lookup.limit,
        config.lookup.window,
        config.chat.rate_limit_idle,
        config.chat.rate_limit_max_users,
    ));
    let uploads = web::Data::new(config.uploads.clone());

    let bind_addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Server running at http://{bind_addr}");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(db_data.clone())
            .app_data(cache_data.clone())
            .app_data(verifier.clone())
            .app_data(chat_data.clone())
            .app_data(lookup_limiter.clone())
            .app_data(uploads.clone())
            .service(web::scope("/api").configure(handlers::init_routes))
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    registry.drain().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
