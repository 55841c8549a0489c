mod config;
mod detection;
mod notifier;
mod pipeline;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use config::Settings;
use detection::{Detector, RemoteModel, verdict_message};
use notifier::HttpNotifier;
use pipeline::{BackgroundDispatcher, JobRunner};
use routes::{UploadConfig, configure_routes};
use std::io;
use std::sync::Arc;
use storage::{S3Service, TempStore};

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, e);
    io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let model = RemoteModel::new(settings.model.endpoint.clone(), settings.model.timeout)
        .map_err(|e| startup_error("Failed to build model client", e))?;
    let detector = Detector::new(
        Arc::new(model),
        settings.model.target_class.clone(),
        settings.model.min_confidence,
    );
    log::info!(
        "Detecting '{}' above {:.2} via {}",
        settings.model.target_class,
        settings.model.min_confidence,
        settings.model.endpoint
    );

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let s3_service = S3Service::new(
        S3Client::new(&aws_config),
        settings.storage.bucket.clone(),
        settings.storage.public_base_url.clone(),
    );

    let notifier = HttpNotifier::new(settings.notify.endpoint.clone(), settings.notify.timeout)
        .map_err(|e| startup_error("Failed to build notification client", e))?;

    let temp_store = TempStore::new(settings.scratch_dir.clone());
    log::info!("Scratch directory: {}", temp_store.root().display());
    let runner = Arc::new(JobRunner::new(
        Arc::new(s3_service),
        Arc::new(notifier),
        temp_store.clone(),
        verdict_message(&settings.model.target_class, true),
        settings.dispatch.publish_timeout,
        settings.notify.timeout,
    ));

    let dispatcher = web::Data::new(BackgroundDispatcher::start(runner, &settings.dispatch));
    let detector = web::Data::new(detector);
    let temp_store = web::Data::new(temp_store);
    let upload_config = web::Data::new(UploadConfig {
        max_upload_bytes: settings.max_upload_bytes,
    });

    log::info!("Starting server on {}", settings.bind_address);

    let server_dispatcher = dispatcher.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(detector.clone())
            .app_data(temp_store.clone())
            .app_data(server_dispatcher.clone())
            .app_data(upload_config.clone())
            .configure(configure_routes)
    })
    .bind(&settings.bind_address)?
    .run()
    .await?;

    log::info!("Server stopped, draining background jobs");
    dispatcher.shutdown().await;
    Ok(())
}
