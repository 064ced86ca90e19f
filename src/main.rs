use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing_subscriber::EnvFilter;

use tricount::auth::PasswordHasher;
use tricount::routes;
use tricount::service::Service;
use tricount::settings::{DatabaseKind, Settings};
use tricount::store::{MemoryStore, MongoStore, Store};

#[actix_web::main]
async fn main() -> io::Result<()> {
    let settings = Settings::new().map_err(io::Error::other)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("tricount={}", settings.log.level))),
        )
        .init();

    let store: Arc<dyn Store> = match settings.database.kind {
        DatabaseKind::Mongo => {
            let uri = settings.database.uri.as_deref().ok_or_else(|| {
                io::Error::other("set database.uri (or MONGODB_URI) to use the mongo store")
            })?;
            tracing::info!(database = %settings.database.name, "connecting to MongoDB");
            let store = MongoStore::connect(uri, &settings.database.name)
                .await
                .map_err(io::Error::other)?;
            tracing::info!("connected");
            Arc::new(store)
        }
        DatabaseKind::Memory => {
            tracing::warn!("using the in-memory store, data is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let hasher = PasswordHasher::new(&settings.auth.secret)
        .map_err(|err| io::Error::other(err.to_string()))?;
    let tolerance = settings.engine.tolerance();
    tracing::info!(
        epsilon = tolerance.epsilon,
        precision = tolerance.precision,
        "settlement tolerance"
    );
    let service = Service::new(store, hasher, tolerance);

    let address = (settings.server.host.clone(), settings.server.port);
    tracing::info!(host = %address.0, port = address.1, "listening");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(service.clone()))
            .configure(routes::configure)
    })
    .bind(address)?
    .run()
    .await
}
