use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::auth::PgSessionResolver;
use crate::settings::Settings;

pub mod checkouts;
pub mod gamification;
mod http;
pub mod ledger;
pub mod splits;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let (ledger_tx, mut ledger_rx) = mpsc::channel(512);
    let (split_tx, mut split_rx) = mpsc::channel(512);
    let (checkout_tx, mut checkout_rx) = mpsc::channel(512);
    let (gamification_tx, mut gamification_rx) = mpsc::channel(512);

    let mut ledger_service = ledger::LedgerService::new();
    let mut split_service = splits::SplitService::new();
    let mut checkout_service = checkouts::CheckoutService::new();
    let mut gamification_service = gamification::GamificationService::new();

    log::info!("Starting ledger service.");
    let ledger_pool = pool.clone();
    tokio::spawn(async move {
        ledger_service
            .run(
                ledger::LedgerRequestHandler::new(ledger_pool),
                &mut ledger_rx,
            )
            .await;
    });

    log::info!("Starting split service.");
    let split_pool = pool.clone();
    tokio::spawn(async move {
        split_service
            .run(splits::SplitRequestHandler::new(split_pool), &mut split_rx)
            .await;
    });

    log::info!("Starting checkout service.");
    let checkout_pool = pool.clone();
    tokio::spawn(async move {
        checkout_service
            .run(
                checkouts::CheckoutRequestHandler::new(checkout_pool),
                &mut checkout_rx,
            )
            .await;
    });

    log::info!("Starting gamification service.");
    let gamification_pool = pool.clone();
    tokio::spawn(async move {
        gamification_service
            .run(
                gamification::GamificationRequestHandler::new(gamification_pool),
                &mut gamification_rx,
            )
            .await;
    });

    log::info!("Starting HTTP server.");
    let resolver = PgSessionResolver::new(pool.clone());
    http::start_http_server(
        &settings.http.bind_addr,
        ledger_tx,
        split_tx,
        checkout_tx,
        gamification_tx,
        resolver,
    )
    .await?;

    Ok(())
}
